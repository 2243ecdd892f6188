//! Best-effort delivery of audit events to the backend.
//!
//! Reads the plaintext mirrors kept by [`audit_log::AuditLogStore`],
//! filters out events already delivered this process lifetime, and submits
//! the rest in one batch per device. The synced-set is in-memory only, so
//! the delivery guarantee is at-least-once across restarts; the backend
//! de-duplicates by `eventId`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use audit_log::{AuditLogStore, LogEvent};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transport seam for event batch delivery, mockable in tests.
///
/// `false` means "try again later"; transport errors and backend
/// rejections are not distinguished here.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn send_logs(&self, events: &[LogEvent]) -> bool;

    /// Upload the canonical encrypted log file for a device.
    async fn upload_log_file(&self, path: &Path, serial: &str) -> bool;
}

#[async_trait]
impl LogTransport for backend_client::ApiClient {
    async fn send_logs(&self, events: &[LogEvent]) -> bool {
        backend_client::ApiClient::send_logs(self, events).await
    }

    async fn upload_log_file(&self, path: &Path, serial: &str) -> bool {
        match backend_client::ApiClient::upload_log_file(self, path, serial).await {
            Ok(()) => true,
            Err(e) => {
                warn!(serial = %serial, error = %e, "encrypted log upload failed");
                false
            }
        }
    }
}

/// Syncs per-device audit logs to the backend.
pub struct LogSyncService {
    transport: Arc<dyn LogTransport>,
    store: Arc<AuditLogStore>,
    /// Event ids delivered this process lifetime. Deliberately volatile:
    /// the backend's eventId de-duplication makes persistence optional.
    already_synced: Mutex<HashSet<Uuid>>,
}

impl LogSyncService {
    pub fn new(transport: Arc<dyn LogTransport>, store: Arc<AuditLogStore>) -> Self {
        Self {
            transport,
            store,
            already_synced: Mutex::new(HashSet::new()),
        }
    }

    /// Sync every device that has a plaintext mirror on disk. Returns the
    /// number of events delivered.
    pub async fn sync_all(&self) -> usize {
        let mut delivered = 0;
        for serial in self.store.mirror_serials() {
            delivered += self.sync_device(&serial).await;
        }
        delivered
    }

    /// Sync one device's pending events. Returns the number delivered;
    /// 0 covers both "nothing pending" and "transport failed, retry later".
    pub async fn sync_device(&self, serial: &str) -> usize {
        let events = self.store.load_local(serial);
        let pending: Vec<LogEvent> = {
            let synced = self.already_synced.lock().expect("lock poisoned");
            events
                .into_iter()
                .filter(|e| !synced.contains(&e.event_id))
                .collect()
        };
        if pending.is_empty() {
            debug!(serial = %serial, "no pending events");
            return 0;
        }

        if self.transport.send_logs(&pending).await {
            {
                let mut synced = self.already_synced.lock().expect("lock poisoned");
                for event in &pending {
                    synced.insert(event.event_id);
                }
            }
            info!(serial = %serial, count = pending.len(), "synced audit events");

            // Ship the canonical encrypted record alongside the batch;
            // failures here are best-effort like everything else.
            let encrypted = self.store.encrypted_log_path(serial);
            if encrypted.is_file() {
                self.transport.upload_log_file(&encrypted, serial).await;
            }
            pending.len()
        } else {
            warn!(serial = %serial, count = pending.len(), "sync failed, will retry");
            0
        }
    }

    /// Spawn the periodic background sync loop.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.sync_all().await;
            }
        })
    }
}
