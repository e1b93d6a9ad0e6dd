//! Quietlink CLI Configuration
//!
//! Loads the dispatcher configuration plus CLI options with figment, layered
//! in priority order: command-line flags, then `QUIETLINK_` environment
//! variables, then the TOML file, then defaults.
//!
//! Environment keys use `__` between levels, e.g.
//! `QUIETLINK_DISPATCHER__TIMER__INITIAL_INTERVAL_MILLIS=5000`.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use quietlink_core::{QueueConfig, QuietlinkConfig};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the quietlink CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Dispatcher configuration
    pub dispatcher: QuietlinkConfig,

    /// Interactive front-end options
    pub cli: CliConfig,
}

/// Interactive front-end options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt printed before each command
    pub prompt: String,

    /// Print observer events to the log
    pub show_events: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "quietlink> ".to_string(),
            show_events: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Overrides
// ----------------------------------------------------------------------------

/// Prefix of environment variables that override file values
pub const ENV_PREFIX: &str = "QUIETLINK_";

impl AppConfig {
    /// Load defaults, then the optional TOML file, then the environment
    ///
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: AppConfig = figment
            .extract()
            .map_err(|e| CliError::Config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        if let Some(path) = path {
            debug!("Loaded configuration from {}", path.display());
        }
        Ok(config)
    }

    /// Load configuration from a TOML file, with environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Parse and validate configuration text, without environment overrides
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `run` flags on top of file values
    pub fn apply_overrides(&mut self, queue: Option<PathBuf>, interval: Option<u64>) {
        if let Some(path) = queue {
            self.dispatcher.queue = QueueConfig {
                path: Some(path),
                ..self.dispatcher.queue.clone()
            };
        }
        if let Some(millis) = interval {
            self.dispatcher.timer.initial_interval_millis = Some(millis);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatcher
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))
    }
}
