//! HTTP client for the tokenlock backend REST surface.

use std::path::Path;
use std::time::Duration;

use audit_log::LogEvent;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Fixed timeout for every backend call; a timeout is handled exactly like
/// "no response".
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Port used when the endpoint is configured as a bare host/IP.
const DEFAULT_PORT: u16 = 8443;

/// Error bodies longer than this are replaced by the status label so HTML
/// error pages never reach the operator.
const ERROR_BODY_LIMIT: usize = 200;

/// Agent type sent on recovery requests: employee workstation.
pub const AGENT_TYPE_EMPLOYEE: i32 = 2;
/// Agent type sent on recovery requests: root/administrative station.
pub const AGENT_TYPE_ROOT: i32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyUsbRequest<'a> {
    serial: &'a str,
    cert_pem: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    serial: &'a str,
    signature_base64: &'a str,
    pin: &'a str,
    mac_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoverRequest<'a> {
    serial: &'a str,
    agent_type: i32,
}

/// Recovery envelope material returned by `/api/usb/recover`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverResponse {
    /// Base64 envelope ciphertext.
    #[serde(rename = "cipher")]
    pub cipher_b64: String,
    /// Base64 16-byte GCM tag.
    #[serde(rename = "tag")]
    pub tag_b64: String,
    /// Role hint; only one backend variant sends it.
    #[serde(default)]
    pub rol: Option<i32>,
}

/// Reduce a non-success response body to something an operator can read.
fn truncate_error(status: StatusCode, body: &str) -> String {
    if body.len() > ERROR_BODY_LIMIT || body.trim().is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

/// Client for the backend REST surface.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Build a client for the configured endpoint: either a full URL or a
    /// bare host/IP, which is expanded to `https://{host}:8443/`.
    ///
    /// INSECURE DEFAULT, inherited from the deployed interface: the fielded
    /// backend presents a self-signed certificate, so certificate
    /// validation is disabled here. A production rollout must replace this
    /// with a pinned CA.
    pub fn new(endpoint: &str) -> ApiResult<Self> {
        let raw = if endpoint.to_ascii_lowercase().starts_with("http") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}:{DEFAULT_PORT}/")
        };
        let base = Url::parse(&raw)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base.join(path)?)
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `POST /api/auth/verify-usb`: submit the token's serial and
    /// certificate, receive an opaque single-use base64 challenge.
    ///
    /// `None` covers every failure shape (non-2xx, connectivity, timeout):
    /// absence of a challenge drives the caller's retry path and is not an
    /// error here.
    pub async fn verify_usb(&self, serial: &str, cert_pem: &str) -> Option<String> {
        let url = self.endpoint("api/auth/verify-usb").ok()?;
        let result = self
            .http
            .post(url)
            .json(&VerifyUsbRequest { serial, cert_pem })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!(serial = %serial, status = %resp.status(), "verify-usb rejected");
                None
            }
            Err(e) => {
                warn!(serial = %serial, error = %e, "verify-usb connection failed");
                None
            }
        }
    }

    /// `POST /api/auth/login`: submit the signed challenge plus PIN and
    /// MAC. The backend is the sole verifier of the PIN.
    pub async fn login(
        &self,
        serial: &str,
        signature_b64: &str,
        pin: &str,
        mac: &str,
    ) -> ApiResult<()> {
        let url = self.endpoint("api/auth/login")?;
        let resp = self
            .http
            .post(url)
            .json(&LoginRequest {
                serial,
                signature_base64: signature_b64,
                pin,
                mac_address: mac,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Backend {
            status: status.as_u16(),
            message: truncate_error(status, &body),
        })
    }

    /// `POST /api/usb/recover`: fetch the sealed volume-recovery envelope
    /// for a serial.
    pub async fn recover_usb(&self, serial: &str, agent_type: i32) -> ApiResult<RecoverResponse> {
        let url = self.endpoint("api/usb/recover")?;
        let resp = self
            .http
            .post(url)
            .json(&RecoverRequest { serial, agent_type })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend {
                status: status.as_u16(),
                message: truncate_error(status, &body),
            });
        }
        Ok(resp.json::<RecoverResponse>().await?)
    }

    /// `POST /api/logs`: submit a batch of events. Best-effort: any
    /// failure is logged and reported as `false` for a later retry.
    pub async fn send_logs(&self, events: &[LogEvent]) -> bool {
        let Ok(url) = self.endpoint("api/logs") else {
            return false;
        };
        match self.http.post(url).json(events).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), count = events.len(), "log batch rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, count = events.len(), "log batch send failed");
                false
            }
        }
    }

    /// `POST /api/logs/upload`: upload the encrypted per-device log file
    /// as multipart form data (`logfile` + `serial`).
    pub async fn upload_log_file(&self, path: &Path, serial: &str) -> ApiResult<()> {
        let url = self.endpoint("api/logs/upload")?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{serial}.enc"));

        let form = reqwest::multipart::Form::new()
            .part(
                "logfile",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("serial", serial.to_string());

        let resp = self.http.post(url).multipart(form).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Backend {
            status: status.as_u16(),
            message: truncate_error(status, &body),
        })
    }
}
