//! RSA signing, verification and envelope encryption.
//!
//! Signatures are RSA-SHA256 with PKCS#1 v1.5 padding; encryption is
//! RSA-OAEP-SHA256. Both match the wire formats the backend expects.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Parse an RSA private key from PEM, trying PKCS#8 first and PKCS#1 as a
/// fallback (token provisioning tools have emitted both framings).
pub fn parse_private_key_pem(pem: &str) -> CryptoResult<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::Key(e.to_string()))
}

/// Parse an RSA public key from PEM (SPKI first, PKCS#1 fallback).
pub fn parse_public_key_pem(pem: &str) -> CryptoResult<RsaPublicKey> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::Key(e.to_string()))
}

/// Sign a message with RSA-SHA256/PKCS#1 v1.5.
pub fn sign(private_key_pem: &str, message: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = parse_private_key_pem(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| CryptoError::Sign(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Verify an RSA-SHA256/PKCS#1 v1.5 signature.
///
/// Never errors: an unparsable key, malformed signature, or plain mismatch
/// all yield `false`.
pub fn verify(public_key_pem: &str, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = parse_public_key_pem(public_key_pem) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(key)
        .verify(message, &signature)
        .is_ok()
}

/// Encrypt with RSA-OAEP-SHA256 under the recipient's public key.
///
/// Plaintext capacity is bounded by the key's modulus (e.g. 190 bytes for a
/// 2048-bit key); larger payloads fail with [`CryptoError::Encrypt`].
pub fn encrypt_asym(public_key_pem: &str, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = parse_public_key_pem(public_key_pem)?;
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))
}

/// Decrypt RSA-OAEP-SHA256 with the private key.
pub fn decrypt_asym(private_key_pem: &str, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = parse_private_key_pem(private_key_pem)?;
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    pub(crate) fn test_keypair() -> (String, String) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private_pem, public_pem)
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (private_pem, public_pem) = test_keypair();
        let message = b"challenge-nonce-bytes";

        let signature = sign(&private_pem, message).unwrap();
        assert!(verify(&public_pem, message, &signature));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let (private_pem, public_pem) = test_keypair();
        let signature = sign(&private_pem, b"original").unwrap();
        assert!(!verify(&public_pem, b"tampered", &signature));
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let (private_pem, public_pem) = test_keypair();
        let mut signature = sign(&private_pem, b"message").unwrap();
        signature[0] ^= 0xFF;
        assert!(!verify(&public_pem, b"message", &signature));
    }

    #[test]
    fn verify_rejects_garbage_key() {
        assert!(!verify("not a pem", b"message", &[0u8; 256]));
    }

    #[test]
    fn sign_fails_on_unparsable_key() {
        let err = sign("-----BEGIN GARBAGE-----", b"message").unwrap_err();
        assert!(matches!(err, CryptoError::Key(_)));
    }

    #[test]
    fn oaep_roundtrip() {
        let (private_pem, public_pem) = test_keypair();
        let plaintext = b"volume recovery passphrase";

        let ciphertext = encrypt_asym(&public_pem, plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

        let decrypted = decrypt_asym(&private_pem, &ciphertext).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn oaep_wrong_key_fails() {
        let (_, public_pem) = test_keypair();
        let (other_private, _) = test_keypair();

        let ciphertext = encrypt_asym(&public_pem, b"secret").unwrap();
        let err = decrypt_asym(&other_private, &ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::Decrypt));
    }

    #[test]
    fn oaep_rejects_oversized_plaintext() {
        let (_, public_pem) = test_keypair();
        // 2048-bit modulus caps OAEP-SHA256 plaintext at 190 bytes.
        let err = encrypt_asym(&public_pem, &[0u8; 4096]).unwrap_err();
        assert!(matches!(err, CryptoError::Encrypt(_)));
    }
}
