//! Error handling module for the consolidator

use thiserror::Error;

/// Main error type for consolidator operations
#[derive(Error, Debug)]
pub enum ConsolidatorError {
    /// Bad path or configuration input
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Scanned file name does not follow `<camera>_<yyyy-mm-dd>_<hh-mm-ss>.<ext>`
    #[error("Malformed clip file name: {name}. Expected <camera>_<yyyy-mm-dd>_<hh-mm-ss>.<ext>")]
    MalformedFilename { name: String },

    /// Two files map to the same camera/date/time
    #[error("Duplicate clip {key}: '{first}' and '{second}'")]
    DuplicateClipKey {
        key: String,
        first: String,
        second: String,
    },

    /// Media probe failed for a single file
    #[error("Failed to probe {path}: {message}")]
    ProbeError { path: String, message: String },

    /// Rendering a job failed
    #[error("Failed to render {output}: {message}")]
    RenderError { output: String, message: String },

    /// Persistent mapping could not be read or written
    #[error("Store error at {path}: {message}")]
    Store { path: String, message: String },

    /// A spawned task panicked or was cancelled
    #[error("Background task failed: {message}")]
    Task { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl ConsolidatorError {
    /// Shorthand for [`ConsolidatorError::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Per-file and per-job failures are recorded and skipped; everything else stops the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ProbeError { .. } | Self::RenderError { .. })
    }
}

impl From<tokio::task::JoinError> for ConsolidatorError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}

/// Result type alias for consolidator operations
pub type ConsolidatorResult<T> = std::result::Result<T, ConsolidatorError>;
