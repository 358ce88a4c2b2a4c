// Ports - Interface definitions (contracts)

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::config::RenderTuning;
use crate::domain::model::{FileStats, MediaProbe};
use crate::error::ConsolidatorResult;

/// Port for media file probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Extract duration, size and codec information from a media file
    async fn probe(&self, path: &Path) -> ConsolidatorResult<MediaProbe>;
}

/// Everything the renderer needs for one job
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Ordered input files
    pub inputs: Vec<PathBuf>,
    /// Subtitle track, if any
    pub subtitles: Option<PathBuf>,
    /// Burn `subtitles` into the picture instead of muxing it as a track
    pub burn_subtitles: bool,
    pub output: PathBuf,
    pub tuning: RenderTuning,
    /// Expected output duration in seconds, used to turn timestamps into fractions
    pub expected_duration: f64,
}

/// Progress reported by a running render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderProgress {
    /// Completion of the current job in `[0, 1]`
    pub fraction: f64,
    /// Output seconds written so far
    pub out_time: f64,
    /// Encoder speed multiplier, when reported
    pub speed: Option<f64>,
    pub fps: Option<f64>,
}

/// Port for the transcoding/concatenation engine
#[async_trait]
pub trait RenderPort: Send + Sync {
    /// Render `request`, publishing progress on `progress` as it goes
    async fn render(
        &self,
        request: &RenderRequest,
        progress: watch::Sender<RenderProgress>,
    ) -> ConsolidatorResult<()>;
}

/// Port for persistent key-value mappings
#[async_trait]
pub trait StorePort: Send + Sync {
    /// Read the mapping at `path`; `None` when nothing is stored yet
    async fn load(&self, path: &Path) -> ConsolidatorResult<Option<Value>>;

    /// Replace the mapping at `path`
    async fn save(&self, path: &Path, value: &Value) -> ConsolidatorResult<()>;
}

/// Port for file system operations
#[async_trait]
pub trait FsPort: Send + Sync {
    /// Names of the entries in `dir`
    async fn list_dir(&self, dir: &Path) -> ConsolidatorResult<Vec<String>>;

    async fn stat(&self, path: &Path) -> ConsolidatorResult<FileStats>;

    async fn exists(&self, path: &Path) -> ConsolidatorResult<bool>;

    /// Create directory (including parent directories)
    async fn create_dir_all(&self, dir: &Path) -> ConsolidatorResult<()>;

    /// Move file, replacing `to` if present
    async fn move_file(&self, from: &Path, to: &Path) -> ConsolidatorResult<()>;

    /// Delete file; a missing file is not an error
    async fn remove_file(&self, path: &Path) -> ConsolidatorResult<()>;
}
