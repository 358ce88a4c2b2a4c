// Filesystem adapter - Directory listing, stat, move and remove over tokio::fs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

use crate::domain::model::FileStats;
use crate::error::ConsolidatorResult;
use crate::ports::FsPort;

/// Local filesystem adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFsAdapter;

impl TokioFsAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn epoch_ms(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
}

#[async_trait]
impl FsPort for TokioFsAdapter {
    async fn list_dir(&self, dir: &Path) -> ConsolidatorResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!("Skipping non UTF-8 entry {:?}", raw),
            }
        }
        Ok(names)
    }

    async fn stat(&self, path: &Path) -> ConsolidatorResult<FileStats> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStats {
            size: metadata.len(),
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
            modified_ms: epoch_ms(metadata.modified()),
            accessed_ms: epoch_ms(metadata.accessed()),
            created_ms: epoch_ms(metadata.created()),
        })
    }

    async fn exists(&self, path: &Path) -> ConsolidatorResult<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, dir: &Path) -> ConsolidatorResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> ConsolidatorResult<()> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                // Cross-device moves cannot be renamed
                debug!(
                    "Rename {} -> {} failed ({}), copying instead",
                    from.display(),
                    to.display(),
                    rename_err
                );
                if tokio::fs::copy(from, to).await.is_err() {
                    return Err(rename_err.into());
                }
                tokio::fs::remove_file(from).await?;
                Ok(())
            }
        }
    }

    async fn remove_file(&self, path: &Path) -> ConsolidatorResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
