//! Execution engine: concurrent batches and progress reporting

pub mod batch;
pub mod progress;

pub use batch::{BatchOptions, BatchOutcome, BatchProgress, BatchRunner, ItemError};
pub use progress::{
    ConsoleProgressReporter, Eta, EtaEstimator, ProgressEvent, ProgressSink, Throttle,
};
