//! On-token storage layout.
//!
//! This layout is an external contract shared with the provisioning tooling
//! and cannot be renamed: `pki/cert.crt` + `pki/priv.key` hold the token's
//! credentials, `config.json` is optional per-token configuration, and root
//! tokens additionally carry marker files under `rusbp.sys/`.

use std::path::{Path, PathBuf};

use token_crypto::RecoveryEnvelope;

use crate::error::{LocateError, LocateResult};

/// Directory holding the token's certificate and private key.
pub const PKI_DIR: &str = "pki";
/// Certificate file (PEM), forwarded verbatim to the backend.
pub const CERT_FILE: &str = "cert.crt";
/// Private key file (PEM), read fresh per signing operation.
pub const KEY_FILE: &str = "priv.key";
/// Optional per-token configuration file.
pub const CONFIG_FILE: &str = "config.json";
/// System directory present only on root/administrative tokens.
pub const SYS_DIR: &str = "rusbp.sys";
/// Root-token marker: sealed volume key material.
pub const BTLK_FILE: &str = ".btlk";
/// Root-token marker: sealed agent material.
pub const BTLK_AGENT_FILE: &str = ".btlk-agente";
/// Envelope-encrypted backend address, unwrapped during provisioning.
pub const BTLK_IP_FILE: &str = ".btlk-ip";

/// Path of the certificate under a mount root.
pub fn cert_path(root: &Path) -> PathBuf {
    root.join(PKI_DIR).join(CERT_FILE)
}

/// Path of the private key under a mount root.
pub fn key_path(root: &Path) -> PathBuf {
    root.join(PKI_DIR).join(KEY_FILE)
}

/// True when the mount root exposes unlocked token credentials.
pub fn has_credentials(root: &Path) -> bool {
    cert_path(root).is_file() && key_path(root).is_file()
}

/// True when the mount root carries the root-token markers.
pub fn is_root_token(root: &Path) -> bool {
    let sys = root.join(SYS_DIR);
    sys.join(BTLK_FILE).is_file() && sys.join(BTLK_AGENT_FILE).is_file()
}

/// Read the token certificate as PEM text.
pub fn load_cert_pem(root: &Path) -> LocateResult<String> {
    let path = cert_path(root);
    if !path.is_file() {
        return Err(LocateError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Read the optional per-token `config.json`, if present.
pub fn read_config_json(root: &Path) -> LocateResult<Option<String>> {
    let path = root.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

/// Unwrap the backend address from a root token's `.btlk-ip` file.
///
/// The file is a raw `tag || ciphertext` recovery envelope sealed under the
/// operator's root secret.
pub fn load_backend_address(root: &Path, secret: &str) -> LocateResult<String> {
    let path = root.join(SYS_DIR).join(BTLK_IP_FILE);
    if !path.is_file() {
        return Err(LocateError::FileNotFound(path.display().to_string()));
    }
    let raw = std::fs::read(path)?;
    let envelope = RecoveryEnvelope::from_bytes(&raw)?;
    Ok(envelope.unwrap(secret)?.trim().to_string())
}
