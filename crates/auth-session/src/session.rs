//! The authentication session state machine.
//!
//! One coordinator task owns all state and serializes every transition:
//! collaborators (the media watcher, the UI, verification and login tasks)
//! only ever talk to it through channels. Removing the token is the
//! universal cancellation signal: it aborts in-flight work, bumps the
//! generation counter so stale completions cannot land, and resets to
//! `Idle`.
//!
//! Verification flow per token insertion:
//! locate candidate → (volume locked? recover envelope → unwrap with the
//! root secret → unlock → settle) → locate credentials → load certificate →
//! request challenge. A missing backend response arms a fixed retry timer;
//! an explicit in-progress flag keeps timer-fired and user-fired retries
//! from overlapping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audit_log::{AuditLogStore, EventType, LogEvent};
use backend_client::ApiError;
use log_sync::LogSyncService;
use token_crypto::RecoveryEnvelope;
use token_locator::{
    TokenIdentity, TokenLocator, VolumeInfo, VolumeUnlockProvider, MOUNT_SETTLE,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::signing;
use crate::traits::{BackendApi, HostInfoProvider};

/// Delay before re-attempting verification after the backend stops
/// responding.
pub const VERIFY_RETRY: Duration = Duration::from_secs(20);

const COMMAND_QUEUE: usize = 16;
const INTERNAL_QUEUE: usize = 32;

/// Commands delivered to the session coordinator.
#[derive(Debug)]
pub enum SessionCommand {
    /// The removable-media watcher saw a change; re-evaluate what is
    /// attached.
    MediaChanged,
    /// The operator submitted a PIN.
    SubmitPin(String),
    /// The operator ended the session.
    Logout,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    TokenDetected,
    VolumeUnlocking,
    CertificateLoaded,
    ChallengeIssued,
    LoginAttempted,
    Authenticated,
    Failed {
        /// Operator-facing message. Never contains key material.
        message: String,
        /// True when the retry timer is armed.
        retrying: bool,
    },
}

/// Per-install session parameters, loaded from sealed settings at startup
/// and passed in explicitly, never process-wide state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Operator identifier stamped into audit events.
    pub user_id: String,
    /// Agent type sent on recovery requests.
    pub agent_type: i32,
    /// Root secret used to unwrap recovery envelopes.
    pub root_secret: String,
}

/// Handle for collaborators: command sender plus state observer.
#[derive(Clone)]
pub struct SessionHandle {
    pub commands: mpsc::Sender<SessionCommand>,
    pub state: watch::Receiver<SessionState>,
}

enum Internal {
    Progress {
        generation: u64,
        state: SessionState,
    },
    VerifyDone {
        generation: u64,
        outcome: VerifyOutcome,
    },
    LoginDone {
        generation: u64,
        outcome: LoginOutcome,
    },
}

enum VerifyOutcome {
    Challenge {
        token: TokenIdentity,
        challenge: String,
    },
    NoResponse,
    Failed {
        message: String,
    },
}

enum LoginOutcome {
    Success,
    Expired,
    NoResponse,
    Rejected { message: String },
}

/// Expired-challenge detection: the backend only tells us via the login
/// failure text (observed variants in both languages).
fn is_challenge_expired(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("vencido") || lower.contains("expired")
}

struct PresentToken {
    serial: String,
}

/// The session state machine. Construct with [`AuthSession::new`] and run
/// with [`AuthSession::start`].
pub struct AuthSession {
    config: SessionConfig,
    api: Arc<dyn BackendApi>,
    locator: Arc<TokenLocator>,
    unlock: Arc<dyn VolumeUnlockProvider>,
    host: Arc<dyn HostInfoProvider>,
    audit: Arc<AuditLogStore>,
    sync: Arc<LogSyncService>,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    /// Bumped on every new verification round and on token removal; any
    /// in-flight task result carrying an older generation is stale.
    generation: u64,
    /// Re-entrancy guard: a user-triggered and a timer-triggered
    /// verification must never overlap.
    verify_in_progress: bool,
    inflight: Option<JoinHandle<()>>,
    retry_deadline: Option<Instant>,
    present: Option<PresentToken>,
    located: Option<TokenIdentity>,
    challenge: Option<String>,
}

impl AuthSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn BackendApi>,
        locator: Arc<TokenLocator>,
        unlock: Arc<dyn VolumeUnlockProvider>,
        host: Arc<dyn HostInfoProvider>,
        audit: Arc<AuditLogStore>,
        sync: Arc<LogSyncService>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            api,
            locator,
            unlock,
            host,
            audit,
            sync,
            state: SessionState::Idle,
            state_tx,
            generation: 0,
            verify_in_progress: false,
            inflight: None,
            retry_deadline: None,
            present: None,
            located: None,
            challenge: None,
        }
    }

    /// Spawn the coordinator task and return the collaborator handle.
    pub fn start(self) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let state_rx = self.state_tx.subscribe();
        tokio::spawn(self.run(command_rx));
        SessionHandle {
            commands: command_tx,
            state: state_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let (internal_tx, mut internal_rx) = mpsc::channel::<Internal>(INTERNAL_QUEUE);

        loop {
            let retry_at = self
                .retry_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                maybe_command = commands.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command, &internal_tx),
                        None => break,
                    }
                }
                Some(event) = internal_rx.recv() => {
                    self.handle_internal(event, &internal_tx);
                }
                _ = tokio::time::sleep_until(retry_at), if self.retry_deadline.is_some() => {
                    debug!("verification retry timer fired");
                    self.retry_deadline = None;
                    self.begin_verification(&internal_tx);
                }
            }
        }

        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
    }

    fn handle_command(&mut self, command: SessionCommand, internal: &mpsc::Sender<Internal>) {
        match command {
            SessionCommand::MediaChanged => self.media_changed(internal),
            SessionCommand::SubmitPin(pin) => self.submit_pin(pin, internal),
            SessionCommand::Logout => self.logout(internal),
        }
    }

    fn media_changed(&mut self, internal: &mpsc::Sender<Internal>) {
        let candidate = self.locator.locate_candidate();
        let present_serial = self.present.as_ref().map(|p| p.serial.clone());
        match (present_serial, candidate) {
            (None, Some(candidate)) => self.token_inserted(candidate, internal),
            (Some(_), None) => self.token_removed(),
            (Some(serial), Some(candidate)) if serial != candidate.serial => {
                self.token_removed();
                self.token_inserted(candidate, internal);
            }
            (Some(_), Some(_)) => {
                // Same token still attached. Volume-event noise doubles as a
                // retry trigger unless a session round is already underway.
                if !matches!(
                    self.state,
                    SessionState::Authenticated
                        | SessionState::ChallengeIssued
                        | SessionState::LoginAttempted
                ) {
                    self.begin_verification(internal);
                }
            }
            (None, None) => {}
        }
    }

    fn token_inserted(&mut self, candidate: VolumeInfo, internal: &mpsc::Sender<Internal>) {
        info!(serial = %candidate.serial, "token detected");
        self.present = Some(PresentToken {
            serial: candidate.serial.clone(),
        });
        self.audit.append(LogEvent::new(
            self.config.user_id.clone(),
            candidate.serial.clone(),
            EventType::Connect,
            self.host.local_ip(),
            self.host.primary_mac(),
        ));
        self.set_state(SessionState::TokenDetected);
        self.begin_verification(internal);
    }

    /// Token removal: the universal cancellation signal.
    fn token_removed(&mut self) {
        let Some(present) = self.present.take() else {
            return;
        };
        info!(serial = %present.serial, "token removed");

        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
        self.verify_in_progress = false;
        self.retry_deadline = None;
        self.challenge = None;
        self.located = None;
        self.generation += 1;

        let forced = matches!(
            self.state,
            SessionState::Authenticated | SessionState::LoginAttempted
        );
        let kind = if forced {
            EventType::UnregisteredDisconnect
        } else {
            EventType::Disconnect
        };
        self.audit.append(LogEvent::new(
            self.config.user_id.clone(),
            present.serial.clone(),
            kind,
            self.host.local_ip(),
            self.host.primary_mac(),
        ));
        self.audit.set_token_signing_key(None);
        self.spawn_sync(present.serial);
        self.set_state(SessionState::Idle);
    }

    fn begin_verification(&mut self, internal: &mpsc::Sender<Internal>) {
        if self.verify_in_progress {
            debug!("verification already in progress; dropping re-entrant request");
            return;
        }
        let Some(candidate) = self.locator.locate_candidate() else {
            debug!("no candidate volume to verify");
            return;
        };

        self.retry_deadline = None;
        self.verify_in_progress = true;
        self.generation += 1;

        let context = VerifyContext {
            generation: self.generation,
            candidate,
            api: self.api.clone(),
            locator: self.locator.clone(),
            unlock: self.unlock.clone(),
            root_secret: self.config.root_secret.clone(),
            agent_type: self.config.agent_type,
            internal: internal.clone(),
        };
        self.inflight = Some(tokio::spawn(run_verification(context)));
    }

    fn submit_pin(&mut self, pin: String, internal: &mpsc::Sender<Internal>) {
        if self.state != SessionState::ChallengeIssued {
            warn!(state = ?self.state, "PIN submitted while no challenge is pending");
            return;
        }
        let (Some(token), Some(challenge)) = (self.located.clone(), self.challenge.take()) else {
            warn!("challenge state lost; re-verifying");
            self.begin_verification(internal);
            return;
        };

        self.set_state(SessionState::LoginAttempted);
        let context = LoginContext {
            generation: self.generation,
            api: self.api.clone(),
            host: self.host.clone(),
            token_root: token.primary_root().to_path_buf(),
            serial: token.serial,
            challenge,
            pin,
            internal: internal.clone(),
        };
        self.inflight = Some(tokio::spawn(run_login(context)));
    }

    fn logout(&mut self, internal: &mpsc::Sender<Internal>) {
        if self.state != SessionState::Authenticated {
            warn!(state = ?self.state, "logout requested outside an active session");
            return;
        }
        let Some(present) = &self.present else {
            return;
        };
        let serial = present.serial.clone();
        info!(serial = %serial, "operator logout");

        self.audit.append(LogEvent::new(
            self.config.user_id.clone(),
            serial.clone(),
            EventType::Logout,
            self.host.local_ip(),
            self.host.primary_mac(),
        ));
        self.spawn_sync(serial);

        // The token is still attached: run a fresh verification round so
        // the next operator gets a new challenge.
        self.set_state(SessionState::TokenDetected);
        self.begin_verification(internal);
    }

    fn handle_internal(&mut self, event: Internal, internal: &mpsc::Sender<Internal>) {
        match event {
            Internal::Progress { generation, state } => {
                if generation == self.generation {
                    self.set_state(state);
                }
            }
            Internal::VerifyDone {
                generation,
                outcome,
            } => {
                if generation != self.generation {
                    debug!("dropping stale verification result");
                    return;
                }
                self.verify_in_progress = false;
                self.inflight = None;
                self.verification_finished(outcome);
            }
            Internal::LoginDone {
                generation,
                outcome,
            } => {
                if generation != self.generation {
                    debug!("dropping stale login result");
                    return;
                }
                self.inflight = None;
                self.login_finished(outcome, internal);
            }
        }
    }

    fn verification_finished(&mut self, outcome: VerifyOutcome) {
        match outcome {
            VerifyOutcome::Challenge { token, challenge } => {
                info!(serial = %token.serial, "challenge issued; waiting for PIN");
                // While this token is attached, its key also signs the
                // encrypted audit log.
                let signing_pem =
                    std::fs::read_to_string(token_locator::layout::key_path(token.primary_root()))
                        .ok();
                self.audit.set_token_signing_key(signing_pem);

                self.located = Some(token);
                self.challenge = Some(challenge);
                self.set_state(SessionState::ChallengeIssued);
            }
            VerifyOutcome::NoResponse => {
                warn!("no response from backend; arming retry timer");
                self.retry_deadline = Some(Instant::now() + VERIFY_RETRY);
                self.set_state(SessionState::Failed {
                    message: "no response from backend; retrying".to_string(),
                    retrying: true,
                });
            }
            VerifyOutcome::Failed { message } => {
                warn!(message = %message, "verification failed");
                self.set_state(SessionState::Failed {
                    message,
                    retrying: false,
                });
            }
        }
    }

    fn login_finished(&mut self, outcome: LoginOutcome, internal: &mpsc::Sender<Internal>) {
        match outcome {
            LoginOutcome::Success => {
                info!("login accepted; session active");
                self.set_state(SessionState::Authenticated);
                if let Some(present) = &self.present {
                    self.spawn_sync(present.serial.clone());
                }
            }
            LoginOutcome::Expired => {
                info!("challenge expired; requesting a fresh one");
                self.set_state(SessionState::TokenDetected);
                self.begin_verification(internal);
            }
            LoginOutcome::NoResponse => {
                warn!("login got no response; arming retry timer");
                self.retry_deadline = Some(Instant::now() + VERIFY_RETRY);
                self.set_state(SessionState::Failed {
                    message: "no response from backend; retrying".to_string(),
                    retrying: true,
                });
            }
            LoginOutcome::Rejected { message } => {
                warn!(message = %message, "login rejected");
                if let Some(present) = &self.present {
                    self.audit.append(LogEvent::new(
                        self.config.user_id.clone(),
                        present.serial.clone(),
                        EventType::LoginFail,
                        self.host.local_ip(),
                        self.host.primary_mac(),
                    ));
                }
                self.set_state(SessionState::Failed {
                    message,
                    retrying: false,
                });
                // The failure may mean the token's certificate changed;
                // run a fresh verification round.
                self.begin_verification(internal);
            }
        }
    }

    fn spawn_sync(&self, serial: String) {
        let sync = self.sync.clone();
        tokio::spawn(async move {
            sync.sync_device(&serial).await;
        });
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state transition");
        }
        self.state = state.clone();
        self.state_tx.send_replace(state);
    }
}

struct VerifyContext {
    generation: u64,
    candidate: VolumeInfo,
    api: Arc<dyn BackendApi>,
    locator: Arc<TokenLocator>,
    unlock: Arc<dyn VolumeUnlockProvider>,
    root_secret: String,
    agent_type: i32,
    internal: mpsc::Sender<Internal>,
}

async fn run_verification(context: VerifyContext) {
    let VerifyContext {
        generation,
        candidate,
        api,
        locator,
        unlock,
        root_secret,
        agent_type,
        internal,
    } = context;

    let root = candidate.mount_roots[0].clone();

    if unlock.is_locked(&root) {
        let _ = internal
            .send(Internal::Progress {
                generation,
                state: SessionState::VolumeUnlocking,
            })
            .await;

        let response = match api.recover_usb(&candidate.serial, agent_type).await {
            Ok(response) => response,
            Err(e) => {
                return send_verify_done(
                    &internal,
                    generation,
                    VerifyOutcome::Failed {
                        message: format!("recovery request failed: {e}"),
                    },
                )
                .await;
            }
        };

        let envelope =
            match RecoveryEnvelope::from_base64_parts(&response.cipher_b64, &response.tag_b64) {
                Ok(envelope) => envelope,
                Err(e) => {
                    return send_verify_done(
                        &internal,
                        generation,
                        VerifyOutcome::Failed {
                            message: format!("recovery envelope malformed: {e}"),
                        },
                    )
                    .await;
                }
            };

        // Wrong root secret and tampered envelope are indistinguishable
        // here; the message stays deliberately generic.
        let passphrase = match envelope.unwrap(&root_secret) {
            Ok(passphrase) => passphrase,
            Err(_) => {
                return send_verify_done(
                    &internal,
                    generation,
                    VerifyOutcome::Failed {
                        message: "recovery envelope could not be unwrapped with the stored root secret"
                            .to_string(),
                    },
                )
                .await;
            }
        };

        if !unlock.unlock(&root, &passphrase) {
            return send_verify_done(
                &internal,
                generation,
                VerifyOutcome::Failed {
                    message: "volume unlock rejected the recovered passphrase".to_string(),
                },
            )
            .await;
        }

        // Let the OS mount the unlocked filesystem before re-locating.
        tokio::time::sleep(MOUNT_SETTLE).await;
    }

    let Some(token) = locator.locate() else {
        return send_verify_done(
            &internal,
            generation,
            VerifyOutcome::Failed {
                message: "token credential structure not found after unlock".to_string(),
            },
        )
        .await;
    };

    let cert_pem = match token_locator::layout::load_cert_pem(token.primary_root()) {
        Ok(pem) => pem,
        Err(e) => {
            return send_verify_done(
                &internal,
                generation,
                VerifyOutcome::Failed {
                    message: format!("certificate unreadable: {e}"),
                },
            )
            .await;
        }
    };
    let _ = internal
        .send(Internal::Progress {
            generation,
            state: SessionState::CertificateLoaded,
        })
        .await;

    let outcome = match api.verify_usb(&token.serial, &cert_pem).await {
        Some(challenge) => VerifyOutcome::Challenge {
            token,
            challenge: challenge.trim().to_string(),
        },
        None => VerifyOutcome::NoResponse,
    };
    send_verify_done(&internal, generation, outcome).await;
}

async fn send_verify_done(
    internal: &mpsc::Sender<Internal>,
    generation: u64,
    outcome: VerifyOutcome,
) {
    let _ = internal
        .send(Internal::VerifyDone {
            generation,
            outcome,
        })
        .await;
}

struct LoginContext {
    generation: u64,
    api: Arc<dyn BackendApi>,
    host: Arc<dyn HostInfoProvider>,
    token_root: PathBuf,
    serial: String,
    challenge: String,
    pin: String,
    internal: mpsc::Sender<Internal>,
}

async fn run_login(context: LoginContext) {
    let LoginContext {
        generation,
        api,
        host,
        token_root,
        serial,
        challenge,
        pin,
        internal,
    } = context;

    let signature = match signing::sign_challenge(&token_root, &challenge) {
        Ok(signature) => signature,
        Err(e) => {
            return send_login_done(
                &internal,
                generation,
                LoginOutcome::Rejected {
                    message: format!("could not sign challenge: {e}"),
                },
            )
            .await;
        }
    };

    let mac = host.primary_mac();
    let outcome = match api.login(&serial, &signature, &pin, &mac).await {
        Ok(()) => LoginOutcome::Success,
        Err(ApiError::Backend { message, .. }) if is_challenge_expired(&message) => {
            LoginOutcome::Expired
        }
        Err(ApiError::Backend { message, .. }) => LoginOutcome::Rejected { message },
        Err(e) => {
            debug!(error = %e, "login transport failure");
            LoginOutcome::NoResponse
        }
    };
    send_login_done(&internal, generation, outcome).await;
}

async fn send_login_done(
    internal: &mpsc::Sender<Internal>,
    generation: u64,
    outcome: LoginOutcome,
) {
    let _ = internal
        .send(Internal::LoginDone {
            generation,
            outcome,
        })
        .await;
}
