//! CLI module for the consolidator
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};

use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

/// CCTV clip consolidator
///
/// Merges each camera's clips for a day into one video with the capture time
/// overlaid, newest day first.
#[derive(Parser, Debug)]
#[command(name = "consolidator")]
#[command(about = "Merge per-camera CCTV clips into one timestamped video per day")]
#[command(version)]
pub struct Cli {
    /// Logging level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub config: args::ConfigArgs,

    /// The command to execute; defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe, group and render every camera/day job
    Run(args::RunArgs),
    /// List cameras, dates and clip counts without probing
    Scan(args::ScanArgs),
    /// Remove cache entries for files that no longer exist
    Clean,
}
