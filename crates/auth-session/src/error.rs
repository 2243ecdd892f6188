//! Error types for the authentication session.

use thiserror::Error;

/// Error type for signing and session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token is present but its private key file is absent.
    #[error("token key file not found: {0}")]
    KeyNotFound(String),

    /// Challenge was not valid base64.
    #[error("challenge is not valid base64: {0}")]
    Challenge(String),

    /// Key parse or signing failure.
    #[error(transparent)]
    Crypto(#[from] token_crypto::CryptoError),

    /// I/O error reading token material.
    #[error("token I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
