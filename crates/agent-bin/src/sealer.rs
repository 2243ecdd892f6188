//! User-scoped sealing for the settings file.
//!
//! Seals with AES-256-GCM under a random key kept next to the settings in a
//! mode-0600 key file. Sealed layout: `nonce(12) || ciphertext || tag(16)`.
//! The key file stands in for an OS keychain on hosts that lack one; the
//! [`agent_config::SealedStore`] seam lets deployments swap in a platform
//! secret store without touching the settings code.

use std::path::Path;

use agent_config::{ConfigError, ConfigResult, SealedStore};
use rand::RngCore;
use token_crypto::{aead_open, aead_seal, GCM_NONCE_LEN, GCM_TAG_LEN};

const SEAL_KEY_FILE: &str = ".sealkey";

pub struct KeyFileSealer {
    key: [u8; 32],
}

impl KeyFileSealer {
    /// Load the seal key, generating one on first use.
    pub fn open(base_dir: &Path) -> ConfigResult<Self> {
        let path = base_dir.join(SEAL_KEY_FILE);
        if path.exists() {
            let raw = std::fs::read(&path)?;
            let key: [u8; 32] = raw
                .try_into()
                .map_err(|_| ConfigError::Seal("seal key file has wrong length".to_string()))?;
            return Ok(Self { key });
        }

        std::fs::create_dir_all(base_dir)?;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        std::fs::write(&path, key)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self { key })
    }
}

impl SealedStore for KeyFileSealer {
    fn seal(&self, plaintext: &[u8]) -> ConfigResult<Vec<u8>> {
        let mut nonce = [0u8; GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let (tag, ciphertext) = aead_seal(&self.key, &nonce, plaintext)
            .map_err(|e| ConfigError::Seal(e.to_string()))?;

        let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len() + GCM_TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn unseal(&self, sealed: &[u8]) -> ConfigResult<Vec<u8>> {
        if sealed.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(ConfigError::Seal("sealed blob too short".to_string()));
        }
        let (nonce, rest) = sealed.split_at(GCM_NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - GCM_TAG_LEN);

        let nonce: [u8; GCM_NONCE_LEN] = nonce.try_into().expect("split length");
        aead_open(&self.key, &nonce, tag, ciphertext)
            .map_err(|e| ConfigError::Seal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seal_unseal_roundtrip() {
        let dir = tempdir().unwrap();
        let sealer = KeyFileSealer::open(dir.path()).unwrap();

        let sealed = sealer.seal(b"root-secret\n10.0.0.1").unwrap();
        assert_ne!(sealed.as_slice(), b"root-secret\n10.0.0.1".as_slice());
        assert_eq!(sealer.unseal(&sealed).unwrap(), b"root-secret\n10.0.0.1");
    }

    #[test]
    fn key_persists_across_instances() {
        let dir = tempdir().unwrap();
        let sealed = KeyFileSealer::open(dir.path())
            .unwrap()
            .seal(b"payload")
            .unwrap();

        let reopened = KeyFileSealer::open(dir.path()).unwrap();
        assert_eq!(reopened.unseal(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn different_key_fails_to_unseal() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let sealed = KeyFileSealer::open(dir_a.path())
            .unwrap()
            .seal(b"payload")
            .unwrap();

        let other = KeyFileSealer::open(dir_b.path()).unwrap();
        assert!(other.unseal(&sealed).is_err());
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let dir = tempdir().unwrap();
        let sealer = KeyFileSealer::open(dir.path()).unwrap();
        assert!(sealer.unseal(&[0u8; 10]).is_err());
    }
}
