//! CCTV clip consolidator library
//!
//! Groups per-camera surveillance clips by day, probes them through a persistent
//! cache, and renders one timestamped video per camera and day.

pub mod adapters;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod subtitle;
pub mod utils;

// Re-export commonly used types
pub use app::{DefaultAppContainer, RunReport};
pub use config::{LayeredConfig, Settings};
pub use domain::index::ClipIndex;
pub use domain::model::{Clip, ClipKey, Job, MediaProbe, SubtitleCue};
pub use error::{ConsolidatorError, ConsolidatorResult};
