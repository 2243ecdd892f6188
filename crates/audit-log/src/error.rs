//! Error types for the audit log store.

use thiserror::Error;

/// Error type for audit log persistence and the encrypted file format.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local log file unreadable or unwritable.
    #[error("log storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event list (de)serialization failed.
    #[error("log serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encryption, signing, or decryption of the log file failed.
    #[error(transparent)]
    Crypto(#[from] token_crypto::CryptoError),

    /// Encrypted log file bytes are structurally invalid.
    #[error("malformed encrypted log file: {0}")]
    Malformed(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
