//! Cryptographic primitives for the tokenlock agent.
//!
//! Four families, all dictated by fielded data formats:
//! - RSA-SHA256/PKCS#1 v1.5 signatures and RSA-OAEP-SHA256 encryption
//!   ([`asym`]): the challenge-response protocol and the encrypted audit
//!   log file.
//! - AES-256-GCM with SHA-256 key derivation ([`aead`]): backend-delivered
//!   recovery envelopes.
//! - PBKDF2 + AES-256-CBC ([`legacy`]): older on-token sealed secrets.
//! - [`envelope::RecoveryEnvelope`]: the `tag || ciphertext` container
//!   tying the GCM pieces together.

mod aead;
mod asym;
mod envelope;
mod error;
mod legacy;

pub use aead::{aead_open, aead_seal, derive_key, GCM_NONCE_LEN, GCM_TAG_LEN};
pub use asym::{
    decrypt_asym, encrypt_asym, parse_private_key_pem, parse_public_key_pem, sign, verify,
};
pub use envelope::{RecoveryEnvelope, ENVELOPE_NONCE};
pub use error::{CryptoError, CryptoResult};
pub use legacy::{decrypt_cbc, derive_key_pbkdf2, encrypt_cbc, PBKDF2_ITERATIONS};
