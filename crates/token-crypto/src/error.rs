//! Error types for token cryptography.

use thiserror::Error;

/// Error type for all cryptographic operations.
///
/// Authentication failures (AEAD tag mismatch) get their own variant because
/// callers must distinguish "wrong secret or tampered data" from I/O-shaped
/// failures. Decrypt errors deliberately carry no detail: partial plaintext
/// and key material must never reach a user-facing message.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed (PEM, PKCS#8/PKCS#1).
    #[error("key material could not be parsed: {0}")]
    Key(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// Asymmetric encryption failed (typically plaintext exceeds the
    /// RSA-OAEP capacity for the key's modulus).
    #[error("asymmetric encryption failed: {0}")]
    Encrypt(String),

    /// Asymmetric or block decryption failed (malformed ciphertext or wrong key).
    #[error("decryption failed")]
    Decrypt,

    /// AEAD authentication tag mismatch: wrong secret or tampered data.
    #[error("authentication tag mismatch")]
    Authentication,

    /// Envelope bytes are structurally malformed (bad length, bad base64).
    #[error("malformed envelope: {0}")]
    Envelope(String),

    /// Decrypted payload is not valid UTF-8.
    #[error("plaintext is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias using CryptoError.
pub type CryptoResult<T> = Result<T, CryptoError>;
