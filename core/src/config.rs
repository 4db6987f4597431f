//! Configuration loading and validation for the lifecycle core
//!
//! This module parses a TOML configuration into a [`CoreConfig`], applies
//! sane defaults via serde, and performs validation with descriptive error
//! messages.

use crate::{CoreError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default bounded wait for tracked tasks during shutdown, in milliseconds
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Default polling period for cooperative-flag termination and pidfile
/// liveness loops, in milliseconds
const DEFAULT_BEAT_INTERVAL_MS: u64 = 100;

/// Runtime configuration for the lifecycle core
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// How long the shutdown sequence waits for tracked tasks before
    /// reporting stragglers (they are never force-cancelled)
    pub shutdown_timeout_ms: u64,
    /// Fixed beat used by cooperative stop-flag polling and pidfile waiters
    pub beat_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            beat_interval_ms: DEFAULT_BEAT_INTERVAL_MS,
        }
    }
}

impl CoreConfig {
    /// Bounded task-drain wait as a [`Duration`]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Beat interval as a [`Duration`]
    pub fn beat_interval(&self) -> Duration {
        Duration::from_millis(self.beat_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_timeout_ms == 0 {
            return Err(CoreError::Configuration(
                "shutdownTimeoutMs must be greater than 0".to_string(),
            ));
        }
        if self.beat_interval_ms == 0 {
            return Err(CoreError::Configuration(
                "beatIntervalMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a [`CoreConfig`] from a TOML file
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<CoreConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::Configuration(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load a [`CoreConfig`] from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<CoreConfig> {
    let cfg: CoreConfig = toml::from_str(input)
        .map_err(|e| CoreError::Configuration(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
