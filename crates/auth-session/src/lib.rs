//! The authentication session: challenge-response login bound to physical
//! possession of a token's signing key.
//!
//! [`AuthSession`] orchestrates locate → (recover + unlock when the volume
//! is sealed) → certificate load → challenge → sign → login, emitting audit
//! events along the way. Collaborators sit behind narrow seams
//! ([`BackendApi`], [`HostInfoProvider`], and the unlock/volume traits from
//! `token-locator`) so the whole machine is drivable in tests.

mod error;
mod session;
mod signing;
mod traits;

#[cfg(test)]
mod tests;

pub use error::{SessionError, SessionResult};
pub use session::{
    AuthSession, SessionCommand, SessionConfig, SessionHandle, SessionState, VERIFY_RETRY,
};
pub use signing::sign_challenge;
pub use traits::{BackendApi, HostInfoProvider};
