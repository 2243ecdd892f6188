//! REST client for the tokenlock backend.
//!
//! Five endpoints: challenge issuance (`verify-usb`), login, volume
//! recovery, event batch upload, and encrypted log file upload. All calls
//! share a fixed 15-second timeout; connectivity failures are retriable by
//! construction and never fatal.

mod client;
mod error;

pub use client::{
    ApiClient, RecoverResponse, AGENT_TYPE_EMPLOYEE, AGENT_TYPE_ROOT, REQUEST_TIMEOUT,
};
pub use error::{ApiError, ApiResult};
