//! Runtime settings.
//!
//! Settings come from an optional TOML file, overridden by `SMOKEWATCH__*`
//! environment variables:
//!
//! ```toml
//! cadence = "30s"
//!
//! [amqp]
//! url = "amqp://127.0.0.1:5672/%2f"
//! purge_on_start = true
//!
//! [[channels]]
//! name = "smoker"
//! column = "Channel1"
//! capacity = 5
//! rule = { kind = "drop-any-of-window", threshold = 15.0 }
//! ```
//!
//! Anything left out falls back to the built-in smoker/food1/food2 setup.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::duration::parse_duration;
use crate::data::{validate_channels, ChannelConfig, WindowMonitor};
use crate::error::ConfigError;

/// Prefix of environment overrides, e.g. `SMOKEWATCH__CADENCE=5s`.
pub const ENV_PREFIX: &str = "SMOKEWATCH";

fn default_cadence() -> String {
    "30s".to_string()
}

fn default_url() -> String {
    "amqp://127.0.0.1:5672/%2f".to_string()
}

fn default_purge() -> bool {
    true
}

/// The `SMOKEWATCH__*` environment source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmqpSettings {
    #[serde(default = "default_url")]
    pub url: String,
    /// Delete each channel's queue before consuming it.
    #[serde(default = "default_purge")]
    pub purge_on_start: bool,
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            purge_on_start: default_purge(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Delay between replayed CSV rows, e.g. "30s" or "500ms".
    #[serde(default = "default_cadence")]
    pub cadence: String,
    #[serde(default)]
    pub amqp: AmqpSettings,
    #[serde(default = "ChannelConfig::defaults")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            amqp: AmqpSettings::default(),
            channels: ChannelConfig::defaults(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if any) and the process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, environment())
    }

    /// Like [`load`](Self::load), with an explicit environment source.
    pub fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        let config = builder.add_source(env).build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the channel list and the cadence.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_channels(&self.channels)?;
        self.cadence()?;
        Ok(())
    }

    /// The replay cadence as a duration.
    pub fn cadence(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.cadence).map_err(|e| ConfigError::InvalidCadence {
            value: self.cadence.clone(),
            reason: e.to_string(),
        })
    }

    /// One fresh monitor per configured channel.
    pub fn monitors(&self) -> Result<Vec<WindowMonitor>, ConfigError> {
        WindowMonitor::from_channels(&self.channels)
    }
}
