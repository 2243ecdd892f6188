//! File system paths for the agent.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the agent runtime.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for agent runtime files (~/.tokenlock)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.tokenlock`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(".tokenlock"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (`config.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the sealed settings file path (`settings.dat`).
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("settings.dat")
    }

    /// Get the audit logs directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
