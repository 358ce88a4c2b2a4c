//! Path normalization against a working directory and a home directory

use crate::error::{ConsolidatorError, ConsolidatorResult};
use std::path::{Component, Path, PathBuf};

/// Directories relative paths are resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    pub cwd: PathBuf,
    pub home: PathBuf,
}

impl PathContext {
    pub fn new(cwd: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home: home.into(),
        }
    }

    /// Context of the running process (current directory, `HOME` or `USERPROFILE`)
    pub fn from_env() -> ConsolidatorResult<Self> {
        let cwd = std::env::current_dir()?;
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| cwd.clone());
        Ok(Self { cwd, home })
    }

    /// Same home, different working directory
    pub fn with_cwd(&self, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home: self.home.clone(),
        }
    }
}

/// Resolve `path` to an absolute path.
///
/// Absolute paths are returned as given. `~` prefixes resolve against `ctx.home`
/// and anything else resolves against `ctx.cwd`; those results are lexically
/// cleaned. No filesystem access.
pub fn normalize(path: impl AsRef<Path>, ctx: &PathContext) -> ConsolidatorResult<PathBuf> {
    let path = path.as_ref();
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(ConsolidatorError::invalid("Path must not be empty"));
    }

    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let joined = match text.strip_prefix('~') {
        Some(rest) => ctx.home.join(rest.trim_start_matches(['/', '\\'])),
        None => ctx.cwd.join(path),
    };
    Ok(clean(&joined))
}

/// Join `segments` and [`normalize`] the result
pub fn normalize_segments<S: AsRef<Path>>(
    segments: &[S],
    ctx: &PathContext,
) -> ConsolidatorResult<PathBuf> {
    if segments.is_empty() {
        return Err(ConsolidatorError::invalid("No path segments given"));
    }
    let joined = segments
        .iter()
        .fold(PathBuf::new(), |acc, segment| acc.join(segment));
    normalize(joined, ctx)
}

/// Replace the directory and/or the extension of `path`
pub fn sibling_with(path: &Path, dir: Option<&Path>, extension: Option<&str>) -> PathBuf {
    let mut result = match (dir, path.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    };
    if let Some(ext) = extension {
        result.set_extension(ext.trim_start_matches('.'));
    }
    result
}

/// Drop `.` components and fold `..` into their parent
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
