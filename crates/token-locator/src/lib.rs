//! Removable-token discovery.
//!
//! [`TokenLocator`] walks the removable volumes reported by a
//! [`RemovableVolumeProvider`] and recognizes the one carrying token
//! credentials. Locating is pure with respect to system state: a sealed
//! volume is reported as a candidate, never unlocked here; the session
//! drives recovery and unlocking through a [`VolumeUnlockProvider`] and
//! retries after [`MOUNT_SETTLE`].

pub mod layout;

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

pub use error::{LocateError, LocateResult};

/// Time to let the OS mount a freshly unlocked volume before re-locating.
pub const MOUNT_SETTLE: Duration = Duration::from_millis(2500);

/// One removable volume as reported by the OS adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Hardware serial as reported by the OS (normalized by the locator).
    pub serial: String,
    /// Mount roots exposed by the volume, in OS order.
    pub mount_roots: Vec<PathBuf>,
}

/// Enumerates currently attached removable volumes.
///
/// OS-specific adapters (WMI, udev, polling) live outside the core.
pub trait RemovableVolumeProvider: Send + Sync {
    /// Snapshot of attached removable volumes. Empty when none are present.
    fn volumes(&self) -> Vec<VolumeInfo>;
}

/// Unlocks OS-encrypted volumes given a recovery passphrase.
///
/// The volume-encryption mechanics are a black box behind this seam.
pub trait VolumeUnlockProvider: Send + Sync {
    /// True when the volume at `mount_root` is still sealed.
    fn is_locked(&self, mount_root: &Path) -> bool;

    /// Attempt to unlock the volume; true on success (or already unlocked).
    fn unlock(&self, mount_root: &Path, passphrase: &str) -> bool;
}

/// A located, unlocked token.
///
/// Produced fresh on every enumeration and never mutated; a new identity
/// replaces the old one. Equality is by serial.
#[derive(Debug, Clone, Eq)]
pub struct TokenIdentity {
    /// Normalized (uppercase) hardware serial.
    pub serial: String,
    /// Mount roots of the token volume.
    pub mount_roots: Vec<PathBuf>,
    /// True when the token carries the root/administrative markers.
    pub is_root_token: bool,
}

impl PartialEq for TokenIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl TokenIdentity {
    /// The primary mount root (first reported by the OS).
    pub fn primary_root(&self) -> &Path {
        &self.mount_roots[0]
    }
}

/// Finds the attached token, if any.
pub struct TokenLocator {
    provider: Arc<dyn RemovableVolumeProvider>,
}

impl TokenLocator {
    /// Create a locator over the given volume provider.
    pub fn new(provider: Arc<dyn RemovableVolumeProvider>) -> Self {
        Self { provider }
    }

    /// Locate an unlocked token: a removable volume whose mount root holds
    /// `pki/cert.crt` and `pki/priv.key`.
    ///
    /// Returns `None` when no such volume is present, a normal, frequent
    /// condition, not a failure. Sealed candidates are skipped here; see
    /// [`Self::locate_candidate`].
    pub fn locate(&self) -> Option<TokenIdentity> {
        for volume in self.provider.volumes() {
            if volume.serial.trim().is_empty() {
                continue;
            }
            for root in &volume.mount_roots {
                if !layout::has_credentials(root) {
                    continue;
                }
                let serial = volume.serial.trim().to_uppercase();
                let is_root = layout::is_root_token(root);
                debug!(serial = %serial, root = %root.display(), is_root, "token located");
                return Some(TokenIdentity {
                    serial,
                    mount_roots: volume.mount_roots.clone(),
                    is_root_token: is_root,
                });
            }
        }
        None
    }

    /// First attached removable volume, unlocked or not, with its serial
    /// normalized. This is the candidate the session feeds into the
    /// recover-and-unlock path when the volume is still sealed.
    pub fn locate_candidate(&self) -> Option<VolumeInfo> {
        self.provider
            .volumes()
            .into_iter()
            .find(|v| !v.serial.trim().is_empty() && !v.mount_roots.is_empty())
            .map(|mut v| {
                v.serial = v.serial.trim().to_uppercase();
                v
            })
    }
}
