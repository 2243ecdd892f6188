//! Legacy PBKDF2 + AES-256-CBC path for on-token sealed secrets.
//!
//! Root tokens carry `.btlk`-style files sealed with this older format:
//! key = PBKDF2-HMAC-SHA256 (100,000 iterations, fixed salt) over the root
//! secret, layout `IV(16) || ciphertext` with PKCS#7 padding. The GCM path
//! in [`crate::aead`] covers backend-delivered envelopes; this one exists
//! for data already in the field.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// PBKDF2 iteration count for the legacy derivation.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed salt baked into every fielded `.btlk` file.
const PBKDF2_SALT: &[u8] = b"rusbp.sys.btlk.v1";

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Derive the 32-byte CBC key from the root secret.
pub fn derive_key_pbkdf2(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), PBKDF2_SALT, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt with AES-256-CBC under a fresh random IV, returning `IV || ciphertext`.
pub fn encrypt_cbc(key: &[u8; 32], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| CryptoError::Key(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an `IV || ciphertext` payload produced by [`encrypt_cbc`].
pub fn decrypt_cbc(key: &[u8; 32], iv_and_ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if iv_and_ciphertext.len() <= IV_LEN
        || (iv_and_ciphertext.len() - IV_LEN) % BLOCK_LEN != 0
    {
        return Err(CryptoError::Envelope(
            "CBC payload must be IV(16) plus whole blocks".to_string(),
        ));
    }
    let (iv, ciphertext) = iv_and_ciphertext.split_at(IV_LEN);

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Key(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_is_deterministic() {
        assert_eq!(derive_key_pbkdf2("root-secret"), derive_key_pbkdf2("root-secret"));
        assert_ne!(derive_key_pbkdf2("root-secret"), derive_key_pbkdf2("other"));
    }

    #[test]
    fn cbc_roundtrip() {
        let key = derive_key_pbkdf2("root-secret");
        let plaintext = b"10.20.30.40";

        let sealed = encrypt_cbc(&key, plaintext).unwrap();
        assert!(sealed.len() > IV_LEN);
        assert_eq!((sealed.len() - IV_LEN) % BLOCK_LEN, 0);

        let opened = decrypt_cbc(&key, &sealed).unwrap();
        assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn cbc_iv_is_fresh_per_encryption() {
        let key = derive_key_pbkdf2("root-secret");
        let a = encrypt_cbc(&key, b"same plaintext").unwrap();
        let b = encrypt_cbc(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cbc_wrong_key_fails() {
        let sealed = encrypt_cbc(&derive_key_pbkdf2("right"), b"payload").unwrap();
        let err = decrypt_cbc(&derive_key_pbkdf2("wrong"), &sealed).unwrap_err();
        assert!(matches!(err, CryptoError::Decrypt));
    }

    #[test]
    fn cbc_rejects_short_payload() {
        let key = derive_key_pbkdf2("root-secret");
        let err = decrypt_cbc(&key, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CryptoError::Envelope(_)));
    }

    #[test]
    fn cbc_rejects_ragged_payload() {
        let key = derive_key_pbkdf2("root-secret");
        let err = decrypt_cbc(&key, &[0u8; IV_LEN + 17]).unwrap_err();
        assert!(matches!(err, CryptoError::Envelope(_)));
    }
}
