//! Command implementations

use anyhow::{Context, Result};
use tracing::info;

use crate::app::{AppContainer, DefaultAppContainer, RunReport, ScanInteractor};
use crate::cli::args::{ConfigArgs, RunArgs, ScanArgs};
use crate::config::{ConfigLayer, LayeredConfig};
use crate::engine::progress::{ConsoleProgressReporter, ProgressSink, PROGRESS_CHANNEL_CAPACITY};
use crate::utils::path::PathContext;

async fn load_config(layer: ConfigLayer) -> Result<LayeredConfig> {
    let paths = PathContext::from_env().context("Failed to read working directory")?;
    LayeredConfig::load(layer, paths)
        .await
        .context("Failed to load configuration")
}

/// Execute the run command
pub async fn run(config_args: &ConfigArgs, args: &RunArgs) -> Result<RunReport> {
    let mut layer = config_args.to_layer();
    args.apply(&mut layer);
    let config = load_config(layer).await?;

    let (sink, reporter) = if args.no_progress {
        (ProgressSink::disabled(), None)
    } else {
        let (sink, rx) = ProgressSink::channel(PROGRESS_CHANNEL_CAPACITY);
        (sink, Some(ConsoleProgressReporter::default().spawn(rx)))
    };

    let container = DefaultAppContainer::new(sink);
    let report = container.consolidate_interactor().execute(&config).await;

    // Dropping the last sink ends the reporter
    drop(container);
    if let Some(reporter) = reporter {
        reporter.await.context("Progress reporter failed")?;
    }

    let report = report.context("Consolidation failed")?;
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} jobs failed",
            report.failed.len(),
            report.rendered + report.failed.len()
        );
    }
    Ok(report)
}

/// Execute the scan command
pub async fn scan(config_args: &ConfigArgs, args: &ScanArgs) -> Result<()> {
    let config = load_config(config_args.to_layer()).await?;
    let settings = config.resolve().context("Invalid configuration")?;

    let container = DefaultAppContainer::new(ProgressSink::disabled());
    let index = container
        .scan_interactor()
        .scan(&settings.vids_dir, &settings.extension)
        .await
        .with_context(|| format!("Failed to scan {}", settings.vids_dir.display()))?;
    let rows = ScanInteractor::summarize(&index);

    if args.json {
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize scan")?;
        println!("{}", json);
        return Ok(());
    }

    println!("Recordings in {}", settings.vids_dir.display());
    let mut current_camera = None;
    for row in &rows {
        if current_camera != Some(row.camera.as_str()) {
            println!("Camera {}:", row.camera);
            current_camera = Some(row.camera.as_str());
        }
        println!("  {}  {:>5} clips", row.date, row.clips);
    }
    println!(
        "{} files, {} cameras, {} dates",
        index.len(),
        index.cameras().len(),
        index.dates().len()
    );
    Ok(())
}

/// Execute the clean command
pub async fn clean(config_args: &ConfigArgs) -> Result<()> {
    let config = load_config(config_args.to_layer()).await?;
    let settings = config.resolve().context("Invalid configuration")?;

    let container = DefaultAppContainer::new(ProgressSink::disabled());
    let removed = container
        .clean_interactor()
        .execute(settings.cache_file())
        .await
        .context("Failed to clean cache")?;
    info!("Cache clean complete");
    println!("Removed {} stale cache entries", removed);
    Ok(())
}
