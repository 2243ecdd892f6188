//! The encrypted per-device log file format.
//!
//! Layout: `[4 bytes little-endian signature length][signature][ciphertext]`
//! where the ciphertext is RSA-OAEP-SHA256 of the compact JSON event list
//! under the backend's public key, and the signature (optional, may be
//! zero-length) is RSA-SHA256/PKCS#1 over that same JSON under the token's
//! private key. Only the backend can decrypt the canonical record; the
//! agent re-encrypts the full history on every append.

use crate::error::{StoreError, StoreResult};
use crate::event::LogEvent;

/// A decoded log file: the event history plus the detached signature, when
/// one was present.
#[derive(Debug)]
pub struct DecodedLogFile {
    pub events: Vec<LogEvent>,
    pub signature: Option<Vec<u8>>,
}

/// Encode an event history into the encrypted file format.
///
/// Without a token signing key the signature field is written zero-length,
/// not omitted.
pub fn encode(
    events: &[LogEvent],
    backend_public_pem: &str,
    token_private_pem: Option<&str>,
) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(events)?;

    let signature = match token_private_pem {
        Some(pem) => token_crypto::sign(pem, &json)?,
        None => Vec::new(),
    };
    let ciphertext = token_crypto::encrypt_asym(backend_public_pem, &json)?;

    let mut out = Vec::with_capacity(4 + signature.len() + ciphertext.len());
    out.extend_from_slice(&(signature.len() as u32).to_le_bytes());
    out.extend_from_slice(&signature);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decode an encrypted log file with the backend's private key.
///
/// This is the backend-side operation; the agent keeps it for format tests
/// and diagnostics. The caller should verify `signature` against the
/// recovered plaintext when present.
pub fn decode(raw: &[u8], backend_private_pem: &str) -> StoreResult<DecodedLogFile> {
    if raw.len() < 4 {
        return Err(StoreError::Malformed(
            "file shorter than the signature-length header".to_string(),
        ));
    }
    let sig_len = u32::from_le_bytes(raw[..4].try_into().expect("4-byte slice")) as usize;
    if raw.len() < 4 + sig_len {
        return Err(StoreError::Malformed(format!(
            "declared signature length {sig_len} exceeds file size"
        )));
    }

    let signature = (sig_len > 0).then(|| raw[4..4 + sig_len].to_vec());
    let ciphertext = &raw[4 + sig_len..];

    let plaintext = token_crypto::decrypt_asym(backend_private_pem, ciphertext)?;
    let events: Vec<LogEvent> = serde_json::from_slice(&plaintext)?;
    Ok(DecodedLogFile { events, signature })
}

/// Recompute the signed payload for verification: the compact JSON of the
/// decoded events, byte-identical to what [`encode`] signed.
pub fn signed_payload(events: &[LogEvent]) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(events)?)
}
