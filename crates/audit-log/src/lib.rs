//! Encrypted per-device audit trail of token and session events.
//!
//! The store keeps one append-only history per device serial, persists it
//! in a backend-only-readable encrypted file plus a plaintext sync mirror,
//! and inserts anomaly events where the raw stream is inconsistent (a
//! missed disconnect, a duplicate disconnect).

pub mod encfile;

mod error;
mod event;
mod store;

pub use error::{StoreError, StoreResult};
pub use event::{EventType, LogEvent};
pub use store::AuditLogStore;
