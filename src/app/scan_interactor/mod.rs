// Scan interactor - Lists a recordings directory and groups its clips

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::index::ClipIndex;
use crate::error::ConsolidatorResult;
use crate::ports::FsPort;

/// Per camera and date clip count, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRow {
    pub camera: String,
    pub date: String,
    pub clips: usize,
}

/// Interactor for the directory scan use case
pub struct ScanInteractor {
    fs_port: Arc<dyn FsPort>,
}

impl ScanInteractor {
    pub fn new(fs_port: Arc<dyn FsPort>) -> Self {
        Self { fs_port }
    }

    /// List `dir`, keep files with `extension` (case-insensitive), and group them
    pub async fn scan(&self, dir: &Path, extension: &str) -> ConsolidatorResult<ClipIndex> {
        info!("Scanning {}", dir.display());
        let mut names: Vec<String> = self
            .fs_port
            .list_dir(dir)
            .await?
            .into_iter()
            .filter(|name| has_extension(name, extension))
            .collect();
        names.sort();
        debug!("{} candidate files", names.len());

        let index = ClipIndex::build(dir, &names)?;
        info!(
            cameras = index.cameras().len(),
            dates = index.dates().len(),
            files = index.len(),
            "Found {} files from {} cameras over {} dates",
            index.len(),
            index.cameras().len(),
            index.dates().len()
        );
        Ok(index)
    }

    /// Clip counts per camera then date, both ascending
    pub fn summarize(index: &ClipIndex) -> Vec<ScanRow> {
        index
            .by_camera()
            .iter()
            .flat_map(|(camera, dates)| {
                dates.iter().map(move |(date, times)| ScanRow {
                    camera: camera.clone(),
                    date: date.clone(),
                    clips: times.len(),
                })
            })
            .collect()
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TokioFsAdapter;
    use crate::error::ConsolidatorError;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    #[tokio::test]
    async fn test_scan_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "1001_2021-01-01_00-00-00.mp4");
        touch(&dir, "1001_2021-01-01_00-05-00.MP4");
        touch(&dir, "2002_2021-01-02_00-00-00.mp4");
        touch(&dir, "notes.txt");
        touch(&dir, "1001_2021-01-01_00-00-00.jpg");

        let interactor = ScanInteractor::new(Arc::new(TokioFsAdapter::new()));
        let index = interactor.scan(dir.path(), "mp4").await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(
            ScanInteractor::summarize(&index),
            vec![
                ScanRow {
                    camera: "1001".to_string(),
                    date: "2021-01-01".to_string(),
                    clips: 2
                },
                ScanRow {
                    camera: "2002".to_string(),
                    date: "2021-01-02".to_string(),
                    clips: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_case_variants_collide() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "1001_2021-01-01_00-00-00.mp4");
        touch(&dir, "1001_2021-01-01_00-00-00.MP4");

        let interactor = ScanInteractor::new(Arc::new(TokioFsAdapter::new()));
        let err = interactor.scan(dir.path(), "mp4").await.unwrap_err();
        assert!(matches!(err, ConsolidatorError::DuplicateClipKey { .. }));
    }

    #[tokio::test]
    async fn test_malformed_name_fails_scan() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "holiday.mp4");
        let interactor = ScanInteractor::new(Arc::new(TokioFsAdapter::new()));
        assert!(matches!(
            interactor.scan(dir.path(), "mp4").await,
            Err(ConsolidatorError::MalformedFilename { .. })
        ));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("a.MP4", "mp4"));
        assert!(has_extension("a.mp4", ".mp4"));
        assert!(!has_extension("a.mp4.part", "mp4"));
        assert!(!has_extension("mp4", "mp4"));
    }
}
