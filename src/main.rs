//! CCTV clip consolidator
//!
//! Scans a directory of per-camera recordings named
//! `<camera>_<yyyy-mm-dd>_<hh-mm-ss>.mp4`, probes them, and renders one video per
//! camera and day with the capture time overlaid.
//!
//! # Usage
//!
//! ```bash
//! consolidator --base-dir ~/Documents/V380
//! consolidator run --date 2021-01-02 --speed 8 --timestamp srt
//! consolidator scan --json
//! consolidator clean
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cctv_consolidator::cli::{args::RunArgs, commands, Cli, Commands};
use cctv_consolidator::utils::logging::LoggingConfig;

/// Main entry point for the consolidator
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    LoggingConfig {
        level: cli.log_level,
        format: cli.log_format,
        target: false,
    }
    .init()?;

    info!("Starting consolidator {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None => {
            commands::run(&cli.config, &RunArgs::default()).await?;
        }
        Some(Commands::Run(args)) => {
            commands::run(&cli.config, &args).await?;
        }
        Some(Commands::Scan(args)) => {
            commands::scan(&cli.config, &args).await?;
        }
        Some(Commands::Clean) => {
            commands::clean(&cli.config).await?;
        }
    }

    Ok(())
}
