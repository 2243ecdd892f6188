//! Error types for backend REST calls.

use thiserror::Error;

/// Error type for backend API operations.
///
/// Transport failures (timeout, refused, DNS) surface as [`ApiError::Http`]
/// and are always retriable; they must never crash the agent. Backend
/// rejections carry the (already truncated) response text.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or transport-level HTTP error from reqwest, including the
    /// 15-second timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status. The message is the
    /// response body, truncated to a status label when oversized.
    #[error("backend rejected request: {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Truncated response text.
        message: String,
    },

    /// The configured endpoint could not be parsed into a URL.
    #[error("invalid backend endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Local file I/O while preparing an upload.
    #[error("upload I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
