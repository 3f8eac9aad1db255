//! Configuration file handling

use serde::Deserialize;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::waiter::{Backoff, PollPolicy};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Workspace used when a scenario does not name one
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Rule preset used when a scenario does not declare rules
    #[serde(default = "default_rule_preset")]
    pub rule_preset: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            rule_preset: default_rule_preset(),
        }
    }
}

fn default_workspace() -> String {
    "workbench/sanity-ws".to_string()
}

fn default_rule_preset() -> String {
    "tracker-v1".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Upper bound on waiting for a record to become visible to a peer
    #[serde(default = "default_convergence")]
    pub convergence_secs: u64,

    /// First interval between convergence polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Cap for exponential backoff; equal to `poll_interval_ms` means fixed polling
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_ms: u64,

    /// Hard deadline for a whole scenario, including setup and teardown
    #[serde(default = "default_scenario_deadline")]
    pub scenario_deadline_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            convergence_secs: default_convergence(),
            poll_interval_ms: default_poll_interval(),
            max_poll_interval_ms: default_max_poll_interval(),
            scenario_deadline_secs: default_scenario_deadline(),
        }
    }
}

fn default_convergence() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    250
}
fn default_max_poll_interval() -> u64 {
    2_000
}
fn default_scenario_deadline() -> u64 {
    120
}

/// Logging configuration
#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write logs to `<data dir>/logs/harness.log`
    #[serde(default)]
    pub file: bool,
}

impl Timeouts {
    /// Poll policy derived from these settings
    pub fn poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_millis(self.poll_interval_ms);
        let max_interval = Duration::from_millis(self.max_poll_interval_ms);
        let backoff = if max_interval > interval {
            Backoff::Exponential {
                factor: 2.0,
                max_interval,
            }
        } else {
            Backoff::Fixed
        };
        PollPolicy {
            timeout: Duration::from_secs(self.convergence_secs),
            interval,
            backoff,
        }
    }

    /// Scenario-wide deadline
    pub fn scenario_deadline(&self) -> Duration {
        Duration::from_secs(self.scenario_deadline_secs)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
