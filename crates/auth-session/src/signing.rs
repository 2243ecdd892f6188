//! Challenge signing against the token's private key.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{SessionError, SessionResult};

/// Sign a base64 challenge with the token's private key, returning the
/// base64 signature.
///
/// The key material is read fresh from the token on every call and dropped
/// at the end of it, never cached, so a token removed mid-operation
/// leaves nothing behind in this process.
pub fn sign_challenge(token_root: &Path, challenge_b64: &str) -> SessionResult<String> {
    let challenge = BASE64
        .decode(challenge_b64.trim())
        .map_err(|e| SessionError::Challenge(e.to_string()))?;

    let key_path = token_locator::layout::key_path(token_root);
    if !key_path.is_file() {
        return Err(SessionError::KeyNotFound(key_path.display().to_string()));
    }
    let key_pem = std::fs::read_to_string(&key_path)?;

    let signature = token_crypto::sign(&key_pem, &challenge)?;
    Ok(BASE64.encode(signature))
}
