//! Recovery envelopes: the `tag || ciphertext` blobs the backend delivers
//! for volume recovery, and the same format used by the on-token
//! `.btlk-ip` file.
//!
//! The envelope is AES-256-GCM with key = SHA-256(secret) and a fixed
//! all-zero 12-byte nonce. The nonce is safe to fix only because every
//! envelope is sealed under a distinct derived key; this matches the
//! fielded data format and cannot be changed unilaterally.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::aead::{aead_open, aead_seal, derive_key, GCM_NONCE_LEN, GCM_TAG_LEN};
use crate::error::{CryptoError, CryptoResult};

/// The fixed all-zero nonce every recovery envelope uses.
pub const ENVELOPE_NONCE: [u8; GCM_NONCE_LEN] = [0u8; GCM_NONCE_LEN];

/// A sealed recovery secret: 16-byte GCM tag plus ciphertext.
///
/// Ciphertext length equals plaintext length (no padding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryEnvelope {
    /// AES-GCM authentication tag, always 16 bytes.
    pub tag: [u8; GCM_TAG_LEN],
    /// Ciphertext, same length as the plaintext.
    pub cipher: Vec<u8>,
}

impl RecoveryEnvelope {
    /// Parse an envelope from raw `tag || ciphertext` bytes (the on-disk
    /// layout of `.btlk-ip`).
    pub fn from_bytes(raw: &[u8]) -> CryptoResult<Self> {
        if raw.len() < GCM_TAG_LEN {
            return Err(CryptoError::Envelope(format!(
                "envelope shorter than its {GCM_TAG_LEN}-byte tag"
            )));
        }
        let mut tag = [0u8; GCM_TAG_LEN];
        tag.copy_from_slice(&raw[..GCM_TAG_LEN]);
        Ok(Self {
            tag,
            cipher: raw[GCM_TAG_LEN..].to_vec(),
        })
    }

    /// Parse an envelope from the backend's separate base64 `cipher` and
    /// `tag` fields (the `/api/usb/recover` response shape).
    pub fn from_base64_parts(cipher_b64: &str, tag_b64: &str) -> CryptoResult<Self> {
        let tag_bytes = BASE64
            .decode(tag_b64)
            .map_err(|e| CryptoError::Envelope(format!("tag is not valid base64: {e}")))?;
        if tag_bytes.len() != GCM_TAG_LEN {
            return Err(CryptoError::Envelope(format!(
                "tag must be {GCM_TAG_LEN} bytes, got {}",
                tag_bytes.len()
            )));
        }
        let cipher = BASE64
            .decode(cipher_b64)
            .map_err(|e| CryptoError::Envelope(format!("cipher is not valid base64: {e}")))?;

        let mut tag = [0u8; GCM_TAG_LEN];
        tag.copy_from_slice(&tag_bytes);
        Ok(Self { tag, cipher })
    }

    /// Serialize back to `tag || ciphertext` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(GCM_TAG_LEN + self.cipher.len());
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.cipher);
        out
    }

    /// Unwrap the envelope with the given secret, yielding the UTF-8
    /// plaintext (a recovery passphrase or a backend address).
    ///
    /// A wrong secret and corrupt/foreign data are indistinguishable here:
    /// both surface as [`CryptoError::Authentication`]. The single coarse
    /// error kind is deliberate; it mirrors what the data format can
    /// actually tell us.
    pub fn unwrap(&self, secret: &str) -> CryptoResult<String> {
        let key = derive_key(secret);
        let plaintext = aead_open(&key, &ENVELOPE_NONCE, &self.tag, &self.cipher)?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// Seal a plaintext under the given secret. Used by provisioning
    /// tooling and tests; the backend normally produces these.
    pub fn seal(plaintext: &str, secret: &str) -> CryptoResult<Self> {
        let key = derive_key(secret);
        let (tag_vec, cipher) = aead_seal(&key, &ENVELOPE_NONCE, plaintext.as_bytes())?;
        let mut tag = [0u8; GCM_TAG_LEN];
        tag.copy_from_slice(&tag_vec);
        Ok(Self { tag, cipher })
    }
}
