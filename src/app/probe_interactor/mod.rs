// Probe interactor - Probes every scanned clip through the cache, concurrently

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{ProbeCache, ProbeOptions};
use crate::domain::index::ClipIndex;
use crate::domain::model::MediaProbe;
use crate::engine::batch::{BatchOptions, BatchProgress, BatchRunner};
use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::FsPort;

/// Probe phase configuration
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub concurrency: usize,
    pub halt_on_error: bool,
    pub retry: bool,
}

/// Probe phase outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub unreadable: usize,
}

/// Interactor for the probe phase
pub struct ProbeInteractor {
    cache: Arc<ProbeCache>,
    fs_port: Arc<dyn FsPort>,
}

impl ProbeInteractor {
    pub fn new(cache: Arc<ProbeCache>, fs_port: Arc<dyn FsPort>) -> Self {
        Self { cache, fs_port }
    }

    /// Stat and probe every clip in `index`, recording each outcome on its clip.
    ///
    /// Per-file failures only mark the clip unreadable unless `halt_on_error` is set.
    pub async fn execute(
        &self,
        index: &mut ClipIndex,
        request: &ProbeRequest,
        progress: &BatchProgress,
    ) -> ConsolidatorResult<ProbeSummary> {
        let paths: Vec<PathBuf> = index.flat().iter().map(|clip| clip.path.clone()).collect();
        info!("Probing {} files", paths.len());

        let runner = BatchRunner::new(BatchOptions {
            concurrency: request.concurrency,
            halt_on_error: request.halt_on_error,
            label: "Probing".to_string(),
        });
        let cache = Arc::clone(&self.cache);
        let fs_port = Arc::clone(&self.fs_port);
        let options = ProbeOptions {
            retry: request.retry,
        };

        let outcome = runner
            .run_all(
                paths,
                move |path| {
                    let cache = Arc::clone(&cache);
                    let fs_port = Arc::clone(&fs_port);
                    async move { probe_one(&cache, fs_port.as_ref(), path, options).await }
                },
                progress,
            )
            .await?;

        for (position, result) in outcome.results.into_iter().enumerate() {
            if let Some(probe) = result {
                index.set_probe_outcome(position, Ok(probe));
            }
        }
        for failure in outcome.errors {
            if failure.error.is_fatal() {
                return Err(failure.error);
            }
            let message = match failure.error {
                ConsolidatorError::ProbeError { message, .. } => message,
                other => other.to_string(),
            };
            index.set_probe_outcome(failure.index, Err(message));
        }

        let summary = ProbeSummary {
            probed: index.len(),
            unreadable: index.unreadable_count(),
        };
        if summary.unreadable > 0 {
            warn!(
                unreadable = summary.unreadable,
                "{} unreadable/corrupt files",
                summary.unreadable
            );
        } else {
            info!("All {} files readable", summary.probed);
        }
        Ok(summary)
    }
}

async fn probe_one(
    cache: &ProbeCache,
    fs_port: &dyn FsPort,
    path: PathBuf,
    options: ProbeOptions,
) -> ConsolidatorResult<MediaProbe> {
    // A file that vanished since the scan is unreadable, not fatal
    cache
        .stat(&path, fs_port)
        .await
        .map_err(|e| ConsolidatorError::ProbeError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    cache.probe(&path, options).await
}
