//! Sealed settings: the operator's root secret and the backend endpoint.
//!
//! Both values are written at provisioning time and loaded once per process
//! lifetime. At rest they are opaque bytes produced by a [`SealedStore`]
//! scoped to the current user; the sealing mechanism itself (keychain,
//! DPAPI-equivalent, key file) is an external collaborator behind the
//! trait.

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

/// The two provisioning-time values everything else depends on.
///
/// Held as plain read-only state and passed by reference into the session
/// and envelope code, never a process-wide static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root secret used to unwrap backend-delivered recovery envelopes.
    pub root_secret: String,
    /// Backend host/IP or full URL.
    pub backend_endpoint: String,
}

/// User-scoped seal/unseal of small secrets at rest.
pub trait SealedStore: Send + Sync {
    /// Seal plaintext bytes for the current user.
    fn seal(&self, plaintext: &[u8]) -> ConfigResult<Vec<u8>>;

    /// Unseal bytes previously produced by [`SealedStore::seal`].
    fn unseal(&self, sealed: &[u8]) -> ConfigResult<Vec<u8>>;
}

/// Persists [`Settings`] sealed at a fixed path.
///
/// On-disk plaintext layout (before sealing): `root_secret\nbackend_endpoint`.
pub struct SettingsStore {
    path: PathBuf,
    sealer: Box<dyn SealedStore>,
}

impl SettingsStore {
    pub fn new(path: PathBuf, sealer: Box<dyn SealedStore>) -> Self {
        Self { path, sealer }
    }

    /// Seal and write the settings.
    pub fn save(&self, settings: &Settings) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let plaintext = format!("{}\n{}", settings.root_secret, settings.backend_endpoint);
        let sealed = self.sealer.seal(plaintext.as_bytes())?;
        std::fs::write(&self.path, sealed)?;
        Ok(())
    }

    /// Load and unseal the settings. `None` means not provisioned yet.
    pub fn load(&self) -> ConfigResult<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&self.path)?;
        let plaintext = self.sealer.unseal(&sealed)?;
        let text = String::from_utf8(plaintext).map_err(|_| ConfigError::Malformed)?;

        let mut lines = text.splitn(2, '\n');
        let (Some(root_secret), Some(backend_endpoint)) = (lines.next(), lines.next()) else {
            return Err(ConfigError::Malformed);
        };
        Ok(Some(Settings {
            root_secret: root_secret.to_string(),
            backend_endpoint: backend_endpoint.trim().to_string(),
        }))
    }

    /// Remove the stored settings (re-provisioning).
    pub fn clear(&self) -> ConfigResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Reversible test sealer: real sealing lives in the binary's adapter.
    struct XorSealer;

    impl SealedStore for XorSealer {
        fn seal(&self, plaintext: &[u8]) -> ConfigResult<Vec<u8>> {
            Ok(plaintext.iter().map(|b| b ^ 0x5A).collect())
        }

        fn unseal(&self, sealed: &[u8]) -> ConfigResult<Vec<u8>> {
            Ok(sealed.iter().map(|b| b ^ 0x5A).collect())
        }
    }

    fn store(dir: &std::path::Path) -> SettingsStore {
        SettingsStore::new(dir.join("settings.dat"), Box::new(XorSealer))
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let settings = Settings {
            root_secret: "482910-118374".to_string(),
            backend_endpoint: "192.168.4.10".to_string(),
        };
        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), Some(settings));
    }

    #[test]
    fn settings_are_not_stored_in_the_clear() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .save(&Settings {
                root_secret: "super-secret".to_string(),
                backend_endpoint: "10.0.0.1".to_string(),
            })
            .unwrap();

        let raw = std::fs::read(dir.path().join("settings.dat")).unwrap();
        let raw_text = String::from_utf8_lossy(&raw);
        assert!(!raw_text.contains("super-secret"));
    }

    #[test]
    fn missing_file_is_not_provisioned() {
        let dir = tempdir().unwrap();
        assert_eq!(store(dir.path()).load().unwrap(), None);
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .save(&Settings {
                root_secret: "s".to_string(),
                backend_endpoint: "e".to_string(),
            })
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn single_line_payload_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.dat");
        let sealer = XorSealer;
        std::fs::write(&path, sealer.seal(b"only-one-line").unwrap()).unwrap();

        let store = SettingsStore::new(path, Box::new(XorSealer));
        assert!(matches!(store.load(), Err(ConfigError::Malformed)));
    }
}
