//! Error types for the export pipeline

use thiserror::Error;

/// Errors that can occur while collecting, formatting or pushing metrics
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid metric name: {0}")]
    InvalidMetricName(String),

    #[error("Biometric source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("No data available (fresh or cached)")]
    NoDataAvailable,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelemetryError {
    /// Whether a push attempt that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::Transport(_) | TelemetryError::HttpStatus { .. }
        )
    }
}
