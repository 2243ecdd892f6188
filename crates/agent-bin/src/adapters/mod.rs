//! OS adapters for the volume enumeration and unlock seams.
//!
//! The core never talks to the OS directly; these adapters implement the
//! `token-locator` traits per platform. Volume encryption (BitLocker) is a
//! Windows concern; on other platforms the unlock seam reports every
//! volume as already unlocked.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "windows")]
mod windows;

use std::path::Path;
use std::sync::Arc;

use token_locator::{RemovableVolumeProvider, VolumeUnlockProvider};
use tracing::warn;

/// Unlock provider for platforms without an encrypted-volume integration:
/// nothing is ever considered locked, and unlocking cannot succeed.
pub struct NoVolumeEncryption;

impl VolumeUnlockProvider for NoVolumeEncryption {
    fn is_locked(&self, _mount_root: &Path) -> bool {
        false
    }

    fn unlock(&self, mount_root: &Path, _passphrase: &str) -> bool {
        warn!(root = %mount_root.display(), "volume unlock requested but not supported on this platform");
        false
    }
}

/// The platform's volume and unlock providers.
pub fn default_providers() -> (Arc<dyn RemovableVolumeProvider>, Arc<dyn VolumeUnlockProvider>) {
    #[cfg(target_os = "windows")]
    {
        (
            Arc::new(windows::WmiVolumeProvider),
            Arc::new(windows::ManageBdeUnlock),
        )
    }
    #[cfg(target_os = "linux")]
    {
        (Arc::new(linux::ByIdVolumeProvider), Arc::new(NoVolumeEncryption))
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        (Arc::new(EmptyVolumes), Arc::new(NoVolumeEncryption))
    }
}

/// Fallback provider for unsupported platforms.
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub struct EmptyVolumes;

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
impl RemovableVolumeProvider for EmptyVolumes {
    fn volumes(&self) -> Vec<token_locator::VolumeInfo> {
        Vec::new()
    }
}
