//! Mock collaborators and a ready-to-drive session harness.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use audit_log::{AuditLogStore, LogEvent};
use backend_client::{ApiError, RecoverResponse};
use log_sync::{LogSyncService, LogTransport};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tempfile::TempDir;
use token_locator::{layout, RemovableVolumeProvider, TokenLocator, VolumeInfo, VolumeUnlockProvider};
use tokio::sync::{watch, Notify};

use crate::{AuthSession, BackendApi, HostInfoProvider, SessionCommand, SessionConfig, SessionHandle, SessionState};

static TEST_KEY_PEM: OnceLock<String> = OnceLock::new();

/// One shared 2048-bit token key for every harness test; generating RSA
/// keys per test would dominate the suite's runtime.
pub fn test_key_pem() -> &'static str {
    TEST_KEY_PEM.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .unwrap()
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

/// Write the unlocked-token credential layout under a mount root.
pub fn write_credentials(root: &Path) {
    std::fs::create_dir_all(root.join(layout::PKI_DIR)).unwrap();
    std::fs::write(layout::cert_path(root), "TEST CERT PEM").unwrap();
    std::fs::write(layout::key_path(root), test_key_pem()).unwrap();
}

/// Mutable set of attached volumes, shared with the locator.
pub struct SharedVolumes(pub Mutex<Vec<VolumeInfo>>);

impl RemovableVolumeProvider for SharedVolumes {
    fn volumes(&self) -> Vec<VolumeInfo> {
        self.0.lock().unwrap().clone()
    }
}

/// Scriptable backend: queues of responses, call counters, and an optional
/// gate that parks `verify_usb` until released.
pub struct MockApi {
    pub verify_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub recover_calls: AtomicUsize,
    pub verify_responses: Mutex<VecDeque<Option<String>>>,
    pub login_responses: Mutex<VecDeque<Result<(), ApiError>>>,
    pub recover_responses: Mutex<VecDeque<RecoverResponse>>,
    pub verify_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verify_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            recover_calls: AtomicUsize::new(0),
            verify_responses: Mutex::new(VecDeque::new()),
            login_responses: Mutex::new(VecDeque::new()),
            recover_responses: Mutex::new(VecDeque::new()),
            verify_gate: Mutex::new(None),
        })
    }

    pub fn queue_verify(&self, response: Option<&str>) {
        self.verify_responses
            .lock()
            .unwrap()
            .push_back(response.map(str::to_string));
    }

    pub fn queue_login_rejection(&self, status: u16, message: &str) {
        self.login_responses.lock().unwrap().push_back(Err(ApiError::Backend {
            status,
            message: message.to_string(),
        }));
    }

    pub fn queue_recover(&self, response: RecoverResponse) {
        self.recover_responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl BackendApi for MockApi {
    async fn verify_usb(&self, _serial: &str, _cert_pem: &str) -> Option<String> {
        let gate = self.verify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Some("ZGVmYXVsdC1jaGFsbGVuZ2U=".to_string()))
    }

    async fn login(
        &self,
        _serial: &str,
        _signature_b64: &str,
        _pin: &str,
        _mac: &str,
    ) -> Result<(), ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn recover_usb(
        &self,
        _serial: &str,
        _agent_type: i32,
    ) -> Result<RecoverResponse, ApiError> {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        self.recover_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ApiError::Backend {
                status: 404,
                message: "no recovery material for serial".to_string(),
            })
    }
}

/// Unlock provider that accepts one passphrase and "mounts" the credential
/// layout on success.
pub struct MockUnlock {
    pub locked: Mutex<HashSet<PathBuf>>,
    pub passphrase: String,
    pub unlock_calls: AtomicUsize,
}

impl MockUnlock {
    pub fn new(passphrase: &str) -> Arc<Self> {
        Arc::new(Self {
            locked: Mutex::new(HashSet::new()),
            passphrase: passphrase.to_string(),
            unlock_calls: AtomicUsize::new(0),
        })
    }
}

impl VolumeUnlockProvider for MockUnlock {
    fn is_locked(&self, mount_root: &Path) -> bool {
        self.locked.lock().unwrap().contains(mount_root)
    }

    fn unlock(&self, mount_root: &Path, passphrase: &str) -> bool {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if passphrase != self.passphrase {
            return false;
        }
        self.locked.lock().unwrap().remove(mount_root);
        write_credentials(mount_root);
        true
    }
}

pub struct FixedHost;

impl HostInfoProvider for FixedHost {
    fn primary_mac(&self) -> String {
        "AA:BB:CC:DD:EE:FF".to_string()
    }

    fn local_ip(&self) -> String {
        "10.0.0.5".to_string()
    }
}

struct AlwaysOkTransport;

#[async_trait]
impl LogTransport for AlwaysOkTransport {
    async fn send_logs(&self, _events: &[LogEvent]) -> bool {
        true
    }

    async fn upload_log_file(&self, _path: &Path, _serial: &str) -> bool {
        true
    }
}

pub const ROOT_SECRET: &str = "root-secret";

/// A fully wired session over mocks, plus everything tests need to poke.
pub struct Harness {
    pub handle: SessionHandle,
    pub api: Arc<MockApi>,
    pub volumes: Arc<SharedVolumes>,
    pub unlock: Arc<MockUnlock>,
    pub store: Arc<AuditLogStore>,
    pub dir: TempDir,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with_unlock_passphrase("P-recovery")
    }

    pub fn start_with_unlock_passphrase(passphrase: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let api = MockApi::new();
        let volumes = Arc::new(SharedVolumes(Mutex::new(Vec::new())));
        let unlock = MockUnlock::new(passphrase);

        // An unparsable backend key only degrades the .enc persist (logged);
        // the mirror keeps working, which is all these tests inspect.
        let store = Arc::new(
            AuditLogStore::new(dir.path().join("logs"), "NOT-A-REAL-KEY").unwrap(),
        );
        let sync = Arc::new(LogSyncService::new(Arc::new(AlwaysOkTransport), store.clone()));
        let locator = Arc::new(TokenLocator::new(volumes.clone()));

        let session = AuthSession::new(
            SessionConfig {
                user_id: "operator-1".to_string(),
                agent_type: backend_client::AGENT_TYPE_EMPLOYEE,
                root_secret: ROOT_SECRET.to_string(),
            },
            api.clone(),
            locator,
            unlock.clone(),
            Arc::new(FixedHost),
            store.clone(),
            sync,
        );
        let handle = session.start();

        Self {
            handle,
            api,
            volumes,
            unlock,
            store,
            dir,
        }
    }

    /// Create an unlocked token volume and announce it.
    pub async fn attach_token(&self, serial: &str) -> PathBuf {
        let root = self.dir.path().join(serial);
        std::fs::create_dir_all(&root).unwrap();
        write_credentials(&root);
        self.push_volume(serial, &root).await;
        root
    }

    /// Create a sealed token volume (no credentials yet) and announce it.
    pub async fn attach_sealed_token(&self, serial: &str) -> PathBuf {
        let root = self.dir.path().join(serial);
        std::fs::create_dir_all(&root).unwrap();
        self.unlock.locked.lock().unwrap().insert(root.clone());
        self.push_volume(serial, &root).await;
        root
    }

    async fn push_volume(&self, serial: &str, root: &Path) {
        self.volumes.0.lock().unwrap().push(VolumeInfo {
            serial: serial.to_string(),
            mount_roots: vec![root.to_path_buf()],
        });
        self.media_changed().await;
    }

    /// Remove every volume and announce the change.
    pub async fn detach_all(&self) {
        self.volumes.0.lock().unwrap().clear();
        self.media_changed().await;
    }

    pub async fn media_changed(&self) {
        self.handle
            .commands
            .send(SessionCommand::MediaChanged)
            .await
            .unwrap();
    }

    pub async fn submit_pin(&self, pin: &str) {
        self.handle
            .commands
            .send(SessionCommand::SubmitPin(pin.to_string()))
            .await
            .unwrap();
    }

    pub async fn logout(&self) {
        self.handle.commands.send(SessionCommand::Logout).await.unwrap();
    }

    pub fn events(&self, serial: &str) -> Vec<LogEvent> {
        self.store.load_local(serial)
    }
}

/// Wait until the observed state satisfies the predicate.
pub async fn wait_state(
    rx: &mut watch::Receiver<SessionState>,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session dropped its state channel")
        .clone()
}

/// Poll an arbitrary condition (call counters, stored events).
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for condition");
}
