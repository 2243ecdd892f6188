//! Per-device append-only audit log store.
//!
//! Each device serial owns one ordered event history with two on-disk
//! representations under the logs directory:
//! - `{SERIAL}.enc`: the canonical record, re-encrypted in full on every
//!   append so only the backend can read it;
//! - `{SERIAL}.json`: a plaintext mirror used solely for batched sync
//!   (resending after reconnect without decrypt rights; never uploaded in
//!   this form).
//!
//! Persistence is best-effort: a storage failure is logged and never blocks
//! the authentication flow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::encfile;
use crate::event::{EventType, LogEvent};
use crate::StoreResult;

/// Append-only encrypted event log, one history per device serial.
pub struct AuditLogStore {
    logs_dir: PathBuf,
    backend_public_pem: String,
    /// Token private key PEM, present while a token with key material is
    /// attached. Absent key means the signature field is written empty.
    token_private_pem: Mutex<Option<String>>,
    /// Per-device histories. The inner mutex makes append atomic per
    /// serial: the forced-disconnect and connect paths may race otherwise.
    devices: Mutex<HashMap<String, Arc<Mutex<Vec<LogEvent>>>>>,
}

impl AuditLogStore {
    /// Open (creating if needed) a store rooted at `logs_dir`.
    pub fn new(logs_dir: PathBuf, backend_public_pem: impl Into<String>) -> StoreResult<Self> {
        std::fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            logs_dir,
            backend_public_pem: backend_public_pem.into(),
            token_private_pem: Mutex::new(None),
            devices: Mutex::new(HashMap::new()),
        })
    }

    /// Install or remove the token signing key for subsequent persists.
    pub fn set_token_signing_key(&self, pem: Option<String>) {
        *self.token_private_pem.lock().expect("lock poisoned") = pem;
    }

    /// Plaintext mirror path for a serial (`{SERIAL}.json`).
    pub fn mirror_path(&self, serial: &str) -> PathBuf {
        self.logs_dir.join(format!("{}.json", serial.to_uppercase()))
    }

    /// Encrypted log path for a serial (`{SERIAL}.enc`).
    pub fn encrypted_log_path(&self, serial: &str) -> PathBuf {
        self.logs_dir.join(format!("{}.enc", serial.to_uppercase()))
    }

    /// Serials that currently have a plaintext mirror on disk.
    pub fn mirror_serials(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.logs_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem()
                        .map(|stem| stem.to_string_lossy().to_uppercase())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Append an event, synthesizing an anomaly record when the history
    /// would otherwise break the connect/disconnect alternation:
    /// Connect-after-Connect inserts an `UnregisteredDisconnect` and
    /// Disconnect-after-Disconnect inserts an `UnknownEvent`, both
    /// inheriting the previous event's ip/mac. The full history is then
    /// re-persisted in both representations.
    pub fn append(&self, event: LogEvent) {
        let serial = event.device_serial.to_uppercase();
        let device = self.device_log(&serial);
        let mut events = device.lock().expect("lock poisoned");

        if let Some(last) = events.last() {
            let synthesized = match (last.event_type, event.event_type) {
                (EventType::Connect, EventType::Connect) => {
                    Some(EventType::UnregisteredDisconnect)
                }
                (EventType::Disconnect, EventType::Disconnect) => Some(EventType::UnknownEvent),
                _ => None,
            };
            if let Some(kind) = synthesized {
                warn!(serial = %serial, ?kind, "inserting anomaly event to keep log consistent");
                let anomaly = LogEvent::new(
                    event.user_id.clone(),
                    serial.clone(),
                    kind,
                    last.ip.clone(),
                    last.mac.clone(),
                );
                events.push(anomaly);
            }
        }

        events.push(event);
        self.persist(&serial, &events);
    }

    /// The plaintext history for a serial (sync path only).
    pub fn load_local(&self, serial: &str) -> Vec<LogEvent> {
        let device = self.device_log(&serial.to_uppercase());
        let events = device.lock().expect("lock poisoned");
        events.clone()
    }

    /// Empty both representations for a serial.
    pub fn clear(&self, serial: &str) {
        let serial = serial.to_uppercase();
        let device = self.device_log(&serial);
        let mut events = device.lock().expect("lock poisoned");
        events.clear();
        self.persist(&serial, &events);
    }

    /// Get or lazily load the per-device history, seeding from the
    /// plaintext mirror when one exists on disk.
    fn device_log(&self, serial: &str) -> Arc<Mutex<Vec<LogEvent>>> {
        let mut devices = self.devices.lock().expect("lock poisoned");
        devices
            .entry(serial.to_string())
            .or_insert_with(|| {
                let events = self.load_mirror(serial);
                debug!(serial = %serial, count = events.len(), "loaded device log");
                Arc::new(Mutex::new(events))
            })
            .clone()
    }

    fn load_mirror(&self, serial: &str) -> Vec<LogEvent> {
        let path = self.mirror_path(serial);
        match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(serial = %serial, error = %e, "mirror unparsable, starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Write both on-disk representations. Failures are logged and
    /// swallowed: audit persistence must never block authentication.
    fn persist(&self, serial: &str, events: &[LogEvent]) {
        let signing_pem = self.token_private_pem.lock().expect("lock poisoned").clone();
        match encfile::encode(events, &self.backend_public_pem, signing_pem.as_deref()) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(self.encrypted_log_path(serial), raw) {
                    warn!(serial = %serial, error = %e, "failed to write encrypted log");
                }
            }
            Err(e) => warn!(serial = %serial, error = %e, "failed to encode encrypted log"),
        }

        match serde_json::to_string_pretty(events) {
            Ok(json) => {
                if let Err(e) = std::fs::write(self.mirror_path(serial), json) {
                    warn!(serial = %serial, error = %e, "failed to write log mirror");
                }
            }
            Err(e) => warn!(serial = %serial, error = %e, "failed to serialize log mirror"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use tempfile::tempdir;

    fn keypair() -> (String, String) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private_pem, public_pem)
    }

    fn event(kind: EventType) -> LogEvent {
        LogEvent::new("user-1", "abc123", kind, "10.0.0.5", "AA:BB:CC")
    }

    #[test]
    fn connect_after_connect_synthesizes_unregistered_disconnect() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        let mut second = event(EventType::Connect);
        second.ip = "10.0.0.9".to_string();
        store.append(event(EventType::Connect));
        store.append(second);

        let events = store.load_local("ABC123");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::Connect);
        assert_eq!(events[1].event_type, EventType::UnregisteredDisconnect);
        assert_eq!(events[2].event_type, EventType::Connect);
        // Synthesized event inherits the PREVIOUS event's ip/mac.
        assert_eq!(events[1].ip, "10.0.0.5");
        assert_eq!(events[1].mac, "AA:BB:CC");
    }

    #[test]
    fn disconnect_after_disconnect_synthesizes_unknown_event() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        store.append(event(EventType::Disconnect));
        store.append(event(EventType::Disconnect));

        let events = store.load_local("ABC123");
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].event_type, EventType::UnknownEvent);
    }

    #[test]
    fn alternating_events_insert_nothing() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        store.append(event(EventType::Connect));
        store.append(event(EventType::Disconnect));
        store.append(event(EventType::Connect));

        assert_eq!(store.load_local("ABC123").len(), 3);
    }

    #[test]
    fn serial_is_normalized_to_uppercase() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        store.append(event(EventType::Connect));
        assert_eq!(store.load_local("abc123").len(), 1);
        assert!(store.mirror_path("abc123").ends_with("ABC123.json"));
    }

    #[test]
    fn mirror_survives_store_restart() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        {
            let store =
                AuditLogStore::new(dir.path().to_path_buf(), public_pem.clone()).unwrap();
            store.append(event(EventType::Connect));
            store.append(event(EventType::Disconnect));
        }

        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();
        let events = store.load_local("ABC123");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::Disconnect);
        assert_eq!(store.mirror_serials(), vec!["ABC123".to_string()]);
    }

    #[test]
    fn clear_empties_both_representations() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        store.append(event(EventType::Connect));
        store.clear("ABC123");

        assert!(store.load_local("ABC123").is_empty());
        let mirror = std::fs::read_to_string(store.mirror_path("ABC123")).unwrap();
        let parsed: Vec<LogEvent> = serde_json::from_str(&mirror).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn corrupt_mirror_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        std::fs::write(dir.path().join("ABC123.json"), "not json").unwrap();

        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();
        assert!(store.load_local("ABC123").is_empty());
    }

    #[test]
    fn oversized_history_still_mirrors() {
        // A 2048-bit backend key caps the .enc payload; the mirror and the
        // in-memory history must keep growing regardless.
        let dir = tempdir().unwrap();
        let (_, public_pem) = keypair();
        let store = AuditLogStore::new(dir.path().to_path_buf(), public_pem).unwrap();

        for _ in 0..6 {
            store.append(event(EventType::Connect));
        }

        // 6 real events plus 5 synthesized anomalies.
        let events = store.load_local("ABC123");
        assert_eq!(events.len(), 11);
        let mirror = std::fs::read_to_string(store.mirror_path("ABC123")).unwrap();
        let parsed: Vec<LogEvent> = serde_json::from_str(&mirror).unwrap();
        assert_eq!(parsed.len(), 11);
    }
}
