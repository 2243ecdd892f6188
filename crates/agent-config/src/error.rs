//! Error types for agent configuration and settings storage.

use thiserror::Error;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error (e.g., home directory not found)
    #[error("path error: {0}")]
    Path(String),

    /// Seal/unseal operation failed.
    #[error("sealed storage error: {0}")]
    Seal(String),

    /// Stored settings bytes don't match the expected layout.
    #[error("settings file is malformed")]
    Malformed,
}

/// Result type alias using ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
