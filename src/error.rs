//! Error types for the telemetry engine
//!
//! Public ingestion operations are total and never surface these errors to
//! callers; the writer, rotator, and query internals use them to report I/O
//! and serialization failures which the engine downgrades to warnings.

use thiserror::Error;

/// Main error type for telemetry storage and query operations
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TelemetryError {
    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
