//! AES-256-GCM authenticated encryption and the passphrase key derivation
//! used for backend-delivered envelopes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
pub const GCM_NONCE_LEN: usize = 12;

/// Authentication tag size for AES-256-GCM (16 bytes).
pub const GCM_TAG_LEN: usize = 16;

/// Derive a 32-byte AES key as SHA-256 of the UTF-8 passphrase.
///
/// This is the fast derivation used for backend-delivered GCM envelopes; the
/// slower PBKDF2 derivation in [`crate::legacy`] covers the on-token CBC
/// format. Both exist in fielded data and must keep working.
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Seal plaintext with AES-256-GCM, returning `(tag, ciphertext)`.
///
/// The ciphertext length equals the plaintext length; the 16-byte tag is
/// detached so callers can lay the two out in whatever wire order they need.
pub fn aead_seal(
    key: &[u8; 32],
    nonce: &[u8; GCM_NONCE_LEN],
    plaintext: &[u8],
) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt("aead seal failed".to_string()))?;
    let tag = sealed.split_off(sealed.len() - GCM_TAG_LEN);
    Ok((tag, sealed))
}

/// Open an AES-256-GCM sealed payload with a detached tag.
///
/// Fails closed with [`CryptoError::Authentication`] on tag mismatch; no
/// partial plaintext is ever returned.
pub fn aead_open(
    key: &[u8; 32],
    nonce: &[u8; GCM_NONCE_LEN],
    tag: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if tag.len() != GCM_TAG_LEN {
        return Err(CryptoError::Envelope(format!(
            "tag must be {GCM_TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(Nonce::from_slice(nonce), combined.as_slice())
        .map_err(|_| CryptoError::Authentication)
}
