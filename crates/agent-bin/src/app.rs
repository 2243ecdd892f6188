//! Agent wiring and the operator input loop.

use std::sync::Arc;
use std::time::Duration;

use agent_config::{Paths, SettingsStore};
use anyhow::Context;
use audit_log::AuditLogStore;
use auth_session::{AuthSession, SessionCommand, SessionConfig, SessionState};
use backend_client::{ApiClient, AGENT_TYPE_EMPLOYEE};
use log_sync::LogSyncService;
use token_locator::TokenLocator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::adapters;
use crate::hostinfo::SystemHostInfo;
use crate::provision;
use crate::sealer::KeyFileSealer;
use crate::watcher;

/// Cadence of the background full sync sweep.
const SYNC_INTERVAL: Duration = Duration::from_secs(60);

fn settings_store(paths: &Paths) -> anyhow::Result<SettingsStore> {
    let sealer = KeyFileSealer::open(paths.base_dir()).context("opening seal key")?;
    Ok(SettingsStore::new(paths.settings_file(), Box::new(sealer)))
}

/// Drop stored settings and run first-time provisioning again.
pub async fn reprovision(paths: &Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;
    let store = settings_store(paths)?;
    store.clear()?;

    let (volumes, unlock) = adapters::default_providers();
    provision::first_run(&store, volumes, unlock, paths).await?;
    Ok(())
}

/// Run the agent, provisioning first when no settings exist yet.
pub async fn run_agent(paths: &Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;
    let store = settings_store(paths)?;
    let (volumes, unlock) = adapters::default_providers();

    let settings = match store.load().context("loading sealed settings")? {
        Some(settings) => settings,
        None => {
            info!("no settings found; starting first-run provisioning");
            provision::first_run(&store, volumes.clone(), unlock.clone(), paths).await?
        }
    };

    let api = Arc::new(
        ApiClient::new(&settings.backend_endpoint).context("building backend client")?,
    );
    info!(endpoint = %api.base_url(), "backend configured");

    let backend_key_path = paths.base_dir().join(provision::BACKEND_KEY_FILE);
    let backend_public_pem = std::fs::read_to_string(&backend_key_path).unwrap_or_else(|_| {
        warn!(path = %backend_key_path.display(), "backend public key missing; encrypted audit log disabled");
        String::new()
    });

    let audit = Arc::new(AuditLogStore::new(paths.logs_dir(), backend_public_pem)?);
    let sync = Arc::new(LogSyncService::new(api.clone(), audit.clone()));
    sync.clone().spawn_periodic(SYNC_INTERVAL);

    let locator = Arc::new(TokenLocator::new(volumes.clone()));
    let session = AuthSession::new(
        SessionConfig {
            user_id: std::env::var("USER").unwrap_or_else(|_| "operator".to_string()),
            agent_type: AGENT_TYPE_EMPLOYEE,
            root_secret: settings.root_secret.clone(),
        },
        api,
        locator,
        unlock,
        Arc::new(SystemHostInfo),
        audit,
        sync,
    );
    let handle = session.start();

    watcher::spawn_polling_watcher(volumes, handle.commands.clone());
    spawn_state_reporter(handle.state.clone());

    operator_loop(handle.commands.clone()).await;
    Ok(())
}

/// Surface state transitions on the console (the lock UI's stand-in).
fn spawn_state_reporter(mut state: tokio::sync::watch::Receiver<SessionState>) {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = state.borrow_and_update().clone();
            match &current {
                SessionState::ChallengeIssued => println!("Token verified - enter PIN:"),
                SessionState::Authenticated => println!("Session active."),
                SessionState::Failed { message, retrying } => {
                    if *retrying {
                        println!("{message}");
                    } else {
                        println!("Authentication failed: {message}");
                    }
                }
                SessionState::Idle => println!("Insert your token."),
                _ => {}
            }
        }
    });
}

/// Read operator input: a PIN per line, or `logout`.
async fn operator_loop(commands: tokio::sync::mpsc::Sender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let command = if line.eq_ignore_ascii_case("logout") {
            SessionCommand::Logout
        } else {
            SessionCommand::SubmitPin(line)
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
}
