//! Tokenlock agent - workstation lock bound to a removable hardware token.

mod adapters;
mod app;
mod hostinfo;
mod provision;
mod sealer;
mod watcher;

use std::path::PathBuf;

use agent_config::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// Tokenlock agent command-line interface.
#[derive(Parser)]
#[command(name = "tokenlock-agent")]
#[command(about = "Workstation lock agent using a removable hardware token")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (settings, logs). Defaults to ~/.tokenlock
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (provisions first when no settings exist)
    Run,
    /// Discard stored settings and run first-time provisioning again
    Provision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    // CLI flag wins over the config file's level.
    if cli.log_level != "info" {
        init_logging(&cli.log_level);
    } else {
        init_logging(&config.log_level);
    }

    match cli.command {
        Some(Commands::Provision) => app::reprovision(&paths).await?,
        Some(Commands::Run) | None => app::run_agent(&paths).await?,
    }

    Ok(())
}
