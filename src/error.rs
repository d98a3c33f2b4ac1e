//! # Error Types
//!
//! Custom error types for DF Companion using `thiserror`.

use thiserror::Error;

/// Main error type for DF Companion
#[derive(Debug, Error)]
pub enum DfCompanionError {
    /// Transport failure (connection refused, timeout, body read)
    #[error("{0}")]
    Http(String),

    /// Device answered with a non-success status
    #[error("HTTP {status}{}", status_body(.body))]
    Status { status: u16, body: String },

    /// Malformed or incomplete telemetry payload
    #[error("{0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Location provider failure
    #[error("Location error: {0}")]
    Location(String),

    /// Caller supplied a value outside the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<reqwest::Error> for DfCompanionError {
    fn from(e: reqwest::Error) -> Self {
        DfCompanionError::Http(e.to_string())
    }
}

/// `": body"`, or nothing when the device sent no body
fn status_body(body: &str) -> String {
    if body.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

/// Result type alias for DF Companion
pub type Result<T> = std::result::Result<T, DfCompanionError>;
