//! Custom error types for paperscout.
//!
//! Two layers live here: [`DiscoveryError`] for failures that reach a caller
//! (language-model calls, configuration, I/O) and [`SourceFailure`] for
//! per-source failures that the aggregator absorbs and logs.

use thiserror::Error;

/// Main error type for paperscout operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// The language-model service failed or returned an unusable payload
    #[error("Upstream service error: {0}")]
    UpstreamService(String),

    /// A required request field was missing or blank
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `DiscoveryError`
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Why a single source contributed nothing to an aggregation run.
///
/// These never cross the aggregator boundary as errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceFailure::Timeout
        } else if let Some(status) = e.status() {
            SourceFailure::HttpStatus(status.as_u16())
        } else {
            SourceFailure::Network(e.to_string())
        }
    }
}
