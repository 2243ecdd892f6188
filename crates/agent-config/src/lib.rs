//! Configuration, paths, sealed settings and logging for the agent.

mod config;
mod error;
mod logging;
mod paths;
mod settings;

pub use config::{Config, DEFAULT_LOG_LEVEL};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use settings::{SealedStore, Settings, SettingsStore};
