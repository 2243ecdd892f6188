//! Collaborator seams for the session state machine.
//!
//! The volume unlock seam lives in `token-locator`; these cover the
//! backend and the host identity. All are mockable in tests.

use async_trait::async_trait;
use backend_client::{ApiError, RecoverResponse};

/// Async facade over the backend calls the session makes.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Request a single-use challenge. `None` covers rejection and
    /// connectivity failure alike.
    async fn verify_usb(&self, serial: &str, cert_pem: &str) -> Option<String>;

    /// Submit the signed challenge plus PIN and MAC.
    async fn login(
        &self,
        serial: &str,
        signature_b64: &str,
        pin: &str,
        mac: &str,
    ) -> Result<(), ApiError>;

    /// Fetch the sealed volume-recovery envelope for a serial.
    async fn recover_usb(&self, serial: &str, agent_type: i32)
        -> Result<RecoverResponse, ApiError>;
}

#[async_trait]
impl BackendApi for backend_client::ApiClient {
    async fn verify_usb(&self, serial: &str, cert_pem: &str) -> Option<String> {
        backend_client::ApiClient::verify_usb(self, serial, cert_pem).await
    }

    async fn login(
        &self,
        serial: &str,
        signature_b64: &str,
        pin: &str,
        mac: &str,
    ) -> Result<(), ApiError> {
        backend_client::ApiClient::login(self, serial, signature_b64, pin, mac).await
    }

    async fn recover_usb(
        &self,
        serial: &str,
        agent_type: i32,
    ) -> Result<RecoverResponse, ApiError> {
        backend_client::ApiClient::recover_usb(self, serial, agent_type).await
    }
}

/// Identity of the workstation the agent runs on.
pub trait HostInfoProvider: Send + Sync {
    /// MAC address of the primary (up) network interface, empty when
    /// undeterminable.
    fn primary_mac(&self) -> String;

    /// Local IPv4 address, empty when undeterminable.
    fn local_ip(&self) -> String;
}
