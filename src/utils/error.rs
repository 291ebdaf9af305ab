//! Error types and handling
//!
//! Common error types used across the recorder.

use crate::sink::SinkError;
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink graph error: {0}")]
    Sink(#[from] SinkError),
}

impl RecorderError {
    /// Short machine-readable code, used as a structured log field
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
            RecorderError::Config(_) => "CONFIG_ERROR",
            RecorderError::Sink(_) => "SINK_ERROR",
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
