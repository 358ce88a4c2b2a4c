// JSON store adapter - Persistent mappings as JSON files with atomic replacement

use async_trait::async_trait;
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::StorePort;

/// Stores each mapping as a pretty-printed JSON file
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    pub fn new() -> Self {
        Self
    }

    fn store_error(path: &Path, message: impl std::fmt::Display) -> ConsolidatorError {
        ConsolidatorError::Store {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Write to a temp file in the target directory, then rename over the target
    fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> ConsolidatorResult<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| Self::store_error(&path, e.error))?;
        Ok(())
    }
}

#[async_trait]
impl StorePort for JsonFileStore {
    async fn load(&self, path: &Path) -> ConsolidatorResult<Option<Value>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Self::store_error(path, e))
    }

    async fn save(&self, path: &Path, value: &Value) -> ConsolidatorResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::write_atomic(target, bytes)).await?
    }
}
