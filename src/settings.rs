//! Runtime settings, optionally loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// Polling and transport tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Seconds between timer driven polls
    pub update_interval: u64,
    /// Additional attempts per device transaction
    pub retry_count: u8,
    /// Cooldown in seconds for coalescing requested refreshes
    pub request_refresh_delay: f64,
    /// Seconds to wait for a connection or a response
    pub connect_timeout: f64,
    /// Settle delay between frames of one transaction
    pub command_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_interval: 10,
            retry_count: 2,
            request_refresh_delay: 2.0,
            connect_timeout: 5.0,
            command_delay_ms: 50,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text; absent keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&text)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.update_interval == 0 {
            return Err(Error::InvalidConfig("update_interval must be positive".into()));
        }
        for (key, value) in [
            ("request_refresh_delay", self.request_refresh_delay),
            ("connect_timeout", self.connect_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{key} must be a non-negative number")));
            }
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn request_refresh_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_refresh_delay)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}
