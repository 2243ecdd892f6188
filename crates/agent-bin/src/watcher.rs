//! Polling stand-in for an OS removable-media watcher.
//!
//! Compares the attached-volume fingerprint on a short interval and sends
//! `MediaChanged` to the session whenever it moves. Event-driven adapters
//! (WMI events, udev netlink) can replace this without touching the
//! session: the seam is just the command channel.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use auth_session::SessionCommand;
use token_locator::{RemovableVolumeProvider, VolumeInfo};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Poll cadence for volume changes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What "the set of attached volumes" means for change detection.
fn fingerprint(volumes: &[VolumeInfo]) -> BTreeSet<String> {
    volumes
        .iter()
        .map(|v| format!("{}:{}", v.serial, v.mount_roots.len()))
        .collect()
}

/// Spawn the polling loop. An initial `MediaChanged` is always sent so a
/// token already attached at startup is picked up immediately.
pub fn spawn_polling_watcher(
    provider: Arc<dyn RemovableVolumeProvider>,
    commands: mpsc::Sender<SessionCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = fingerprint(&provider.volumes());
        let _ = commands.send(SessionCommand::MediaChanged).await;

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let current = fingerprint(&provider.volumes());
            if current != last {
                debug!(volumes = current.len(), "removable media changed");
                last = current;
                if commands.send(SessionCommand::MediaChanged).await.is_err() {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn volume(serial: &str, roots: usize) -> VolumeInfo {
        VolumeInfo {
            serial: serial.to_string(),
            mount_roots: (0..roots).map(|i| PathBuf::from(format!("/mnt/{i}"))).collect(),
        }
    }

    #[test]
    fn fingerprint_changes_on_attach_and_mount() {
        let none = fingerprint(&[]);
        let one = fingerprint(&[volume("ABC", 1)]);
        let remounted = fingerprint(&[volume("ABC", 2)]);

        assert_ne!(none, one);
        // A newly mounted root on the same stick counts as a change (a
        // locked volume gaining its filesystem after unlock).
        assert_ne!(one, remounted);
        assert_eq!(one, fingerprint(&[volume("ABC", 1)]));
    }
}
