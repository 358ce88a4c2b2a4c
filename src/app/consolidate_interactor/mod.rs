// Consolidate interactor - The full scan, probe, build and render workflow

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::app::probe_interactor::{ProbeInteractor, ProbeRequest};
use crate::app::render_interactor::{JobRunner, RunReport, RunnerOptions};
use crate::app::scan_interactor::ScanInteractor;
use crate::cache::ProbeCache;
use crate::config::{LayeredConfig, Settings};
use crate::domain::rules::JobBuilder;
use crate::engine::batch::BatchProgress;
use crate::engine::progress::{ProgressSink, DEFAULT_PROGRESS_INTERVAL};
use crate::error::ConsolidatorResult;
use crate::ports::{FsPort, ProbePort, RenderPort, StorePort};
use crate::utils::Utils;

/// Interactor for the consolidate use case
pub struct ConsolidateInteractor {
    fs_port: Arc<dyn FsPort>,
    store: Arc<dyn StorePort>,
    prober: Arc<dyn ProbePort>,
    renderer: Arc<dyn RenderPort>,
    sink: ProgressSink,
}

impl ConsolidateInteractor {
    pub fn new(
        fs_port: Arc<dyn FsPort>,
        store: Arc<dyn StorePort>,
        prober: Arc<dyn ProbePort>,
        renderer: Arc<dyn RenderPort>,
        sink: ProgressSink,
    ) -> Self {
        Self {
            fs_port,
            store,
            prober,
            renderer,
            sink,
        }
    }

    /// Run the whole workflow for `config`
    pub async fn execute(&self, config: &LayeredConfig) -> ConsolidatorResult<RunReport> {
        let started = Instant::now();
        let settings = config.resolve()?;
        info!(
            "Consolidating {} into {}",
            settings.vids_dir.display(),
            settings.output_dir.display()
        );

        let cache = Arc::new(
            ProbeCache::load(
                Arc::clone(&self.store),
                settings.cache_file(),
                Arc::clone(&self.prober),
                settings.cache_throttle,
            )
            .await?,
        );

        let outcome = self.pipeline(config, &settings, &cache).await;
        // The final flush runs even when the pipeline failed
        if let Err(error) = cache.close().await {
            warn!("Could not save probe cache: {}", error);
        }
        let mut report = outcome?;

        report.elapsed = started.elapsed();
        info!(
            rendered = report.rendered,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Finished in {}",
            Utils::format_duration(report.elapsed)
        );
        for failure in &report.failed {
            warn!("Failed: {} ({})", failure.label, failure.error);
        }
        Ok(report)
    }

    async fn pipeline(
        &self,
        config: &LayeredConfig,
        settings: &Settings,
        cache: &Arc<ProbeCache>,
    ) -> ConsolidatorResult<RunReport> {
        let mut index = ScanInteractor::new(Arc::clone(&self.fs_port))
            .scan(&settings.vids_dir, &settings.extension)
            .await?;

        let progress = BatchProgress::new(self.sink.clone(), DEFAULT_PROGRESS_INTERVAL);
        ProbeInteractor::new(Arc::clone(cache), Arc::clone(&self.fs_port))
            .execute(
                &mut index,
                &ProbeRequest {
                    concurrency: settings.concurrency,
                    halt_on_error: settings.halt_on_error,
                    retry: settings.retry,
                },
                &progress,
            )
            .await?;
        // Cache persistence is best effort
        if let Err(error) = cache.flush().await {
            warn!("Could not save probe cache: {}", error);
        }

        let jobs = JobBuilder::build(&index, config)?;
        let clips: usize = jobs.iter().map(|job| job.clips.len()).sum();
        info!(
            jobs = jobs.len(),
            clips,
            "{} jobs over {} clips",
            jobs.len(),
            clips
        );

        JobRunner::new(
            Arc::clone(&self.renderer),
            Arc::clone(&self.fs_port),
            self.sink.clone(),
            RunnerOptions {
                halt_on_render_error: settings.halt_on_render_error,
                skip_existing: settings.skip_existing,
            },
        )
        .run(&jobs)
        .await
    }
}
