//! Error types for token location and on-token file access.

use thiserror::Error;

/// Error type for token filesystem access.
///
/// Note that "no token present" is NOT an error; [`crate::TokenLocator::locate`]
/// returns `Option` for that. These variants cover a token that is present
/// but broken.
#[derive(Debug, Error)]
pub enum LocateError {
    /// Expected on-token file is absent (e.g. `pki/priv.key`).
    #[error("token file not found: {0}")]
    FileNotFound(String),

    /// I/O error reading token material.
    #[error("token I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-token sealed material failed to decrypt.
    #[error(transparent)]
    Crypto(#[from] token_crypto::CryptoError),
}

/// Result type alias using LocateError.
pub type LocateResult<T> = Result<T, LocateError>;
