//! First-run provisioning against the root token.
//!
//! The operator plugs in the root token and types its recovery passphrase.
//! The flow unlocks the volume when needed, waits for the credential
//! structure to appear, unwraps the backend address from `.btlk-ip`,
//! installs the backend public key when the token carries one, and persists
//! the sealed settings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_config::{Paths, Settings, SettingsStore};
use anyhow::{bail, Context};
use token_locator::{layout, RemovableVolumeProvider, VolumeUnlockProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Poll cadence while waiting for the root token or its mounted structure.
const WAIT_STEP: Duration = Duration::from_millis(1200);
/// Give up waiting for the unlocked structure after this long.
const STRUCTURE_TIMEOUT: Duration = Duration::from_secs(18);
/// Public key the audit log is encrypted under, installed from the root
/// token when present.
pub const BACKEND_KEY_FILE: &str = "backend.pub";

pub async fn first_run(
    store: &SettingsStore,
    volumes: Arc<dyn RemovableVolumeProvider>,
    unlock: Arc<dyn VolumeUnlockProvider>,
    paths: &Paths,
) -> anyhow::Result<Settings> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(volume) = volumes.volumes().into_iter().next() else {
            info!("connect the root token to provision this workstation");
            tokio::time::sleep(WAIT_STEP).await;
            continue;
        };
        let root = volume.mount_roots[0].clone();

        println!("Root token detected ({}).", volume.serial);
        println!("Enter its recovery passphrase:");
        let Some(passphrase) = stdin.next_line().await.context("stdin closed")? else {
            bail!("no recovery passphrase provided");
        };
        let passphrase = passphrase.trim().to_string();
        if passphrase.is_empty() {
            warn!("empty passphrase; trying again");
            continue;
        }

        if unlock.is_locked(&root) && !unlock.unlock(&root, &passphrase) {
            warn!("the volume did not accept that passphrase");
            continue;
        }

        if !wait_for_structure(&root).await {
            warn!(root = %root.display(), "token structure did not appear after unlock");
            continue;
        }

        let backend_endpoint = match layout::load_backend_address(&root, &passphrase) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(error = %e, "backend address could not be read; wrong passphrase?");
                continue;
            }
        };

        install_backend_key(&root, paths);

        let settings = Settings {
            root_secret: passphrase,
            backend_endpoint,
        };
        store.save(&settings).context("persisting sealed settings")?;
        info!(endpoint = %settings.backend_endpoint, "provisioning complete");
        return Ok(settings);
    }
}

/// Wait (bounded) until both `rusbp.sys/` and `pki/` are visible.
async fn wait_for_structure(root: &Path) -> bool {
    let mut waited = Duration::ZERO;
    loop {
        let sys_ok = root.join(layout::SYS_DIR).is_dir();
        let pki_ok = root.join(layout::PKI_DIR).is_dir();
        if sys_ok && pki_ok {
            return true;
        }
        if waited >= STRUCTURE_TIMEOUT {
            return false;
        }
        tokio::time::sleep(WAIT_STEP).await;
        waited += WAIT_STEP;
    }
}

/// Copy the backend public key off the root token, if it carries one. The
/// audit store degrades to plaintext-mirror-only without it.
fn install_backend_key(root: &Path, paths: &Paths) {
    let source = root.join(layout::SYS_DIR).join(BACKEND_KEY_FILE);
    if !source.is_file() {
        warn!("root token carries no backend public key; encrypted audit log disabled");
        return;
    }
    let target = paths.base_dir().join(BACKEND_KEY_FILE);
    if let Err(e) = std::fs::copy(&source, &target) {
        warn!(error = %e, "backend public key could not be installed");
    } else {
        info!("backend public key installed");
    }
}
