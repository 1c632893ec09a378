//! Taskwarden configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WardenError};

/// Scheduler configuration, loaded from `~/.taskwarden/config.toml`.
///
/// Every field has a production default; a missing or partial config file is
/// never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between soft-stop retries for an unresponsive task.
    #[serde(default = "default_soft_stop_retry_secs")]
    pub soft_stop_retry_secs: u64,
    /// Seconds after the first stop attempt before escalating to a hard
    /// stop. Zero disables hard-stop escalation (and with it the emergency
    /// shutdown path).
    #[serde(default = "default_hard_stop_timeout_secs")]
    pub hard_stop_timeout_secs: u64,
    /// Milliseconds between stop-monitor polls of the task's running state.
    #[serde(default = "default_monitor_poll_millis")]
    pub monitor_poll_millis: u64,
    /// Milliseconds between condition-watchdog reconciliation ticks.
    #[serde(default = "default_watchdog_interval_millis")]
    pub watchdog_interval_millis: u64,
    /// Whether condition watchdogs run at all.
    #[serde(default = "bool_true")]
    pub watchdogs_enabled: bool,
}

fn default_soft_stop_retry_secs() -> u64 { 30 }
fn default_hard_stop_timeout_secs() -> u64 { 240 }
fn default_monitor_poll_millis() -> u64 { 600 }
fn default_watchdog_interval_millis() -> u64 { 10_000 }
fn bool_true() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            soft_stop_retry_secs: default_soft_stop_retry_secs(),
            hard_stop_timeout_secs: default_hard_stop_timeout_secs(),
            monitor_poll_millis: default_monitor_poll_millis(),
            watchdog_interval_millis: default_watchdog_interval_millis(),
            watchdogs_enabled: bool_true(),
        }
    }
}

impl SchedulerConfig {
    /// Load config from the default path (~/.taskwarden/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WardenError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| WardenError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| WardenError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskwarden")
            .join("config.toml")
    }

    pub fn soft_stop_retry_interval(&self) -> Duration {
        Duration::from_secs(self.soft_stop_retry_secs)
    }

    pub fn hard_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_stop_timeout_secs)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_millis)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_millis)
    }
}
