//! Error types for the `permgate` core library.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Layered settings failed to (de)serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
