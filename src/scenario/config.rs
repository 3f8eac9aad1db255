//! Scenario file format
//!
//! Defines the data structures for deserializing YAML scenarios and
//! resolving them against the harness configuration.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::{generate_id, Error, Result};
use crate::record::{AuthoredRecord, ID_PLACEHOLDER};
use crate::session::Identity;
use crate::sim::PlatformSettings;
use crate::transform::RuleSet;
use crate::waiter::PollPolicy;

/// A complete scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct ScenarioFile {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Workspace URI every session opens; defaults to the configured one
    pub workspace: Option<String>,
    /// Participating sessions, one per simulated user
    pub sessions: Vec<SessionSpec>,
    /// Actor that authors the record
    pub author: String,
    /// Record the author creates; strings may contain `{id}`
    pub record: AuthoredRecord,
    /// Normalization rules the peers verify against
    pub rules: Option<RulesSpec>,
    /// Overrides for the convergence wait
    #[serde(default)]
    pub wait: WaitOverride,
    /// Overall deadline in seconds
    pub deadline_secs: Option<u64>,
    /// Simulated platform settings
    #[serde(default)]
    pub platform: PlatformSettings,
}

/// One participating session
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    /// Name used in logs and reports
    pub actor: String,
    /// Login identity
    pub identity: Identity,
}

/// Rules as a preset name or an inline rule set
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RulesSpec {
    Preset { preset: String },
    Inline(RuleSet),
}

/// Per-scenario overrides for the convergence wait
#[derive(Deserialize, Debug, Default, Clone)]
pub struct WaitOverride {
    pub timeout_secs: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl WaitOverride {
    fn apply(&self, mut policy: PollPolicy) -> Result<PollPolicy> {
        match (self.timeout_secs, self.timeout_ms) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "wait: set either timeout_secs or timeout_ms, not both".to_string(),
                ))
            }
            (Some(secs), None) => policy.timeout = Duration::from_secs(secs),
            (None, Some(ms)) => policy.timeout = Duration::from_millis(ms),
            (None, None) => {}
        }
        if let Some(ms) = self.poll_interval_ms {
            policy.interval = Duration::from_millis(ms);
        }
        Ok(policy)
    }
}

/// A fully resolved scenario, ready to run
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub workspace: String,
    pub sessions: Vec<SessionSpec>,
    pub author: String,
    /// Record template; `{id}` is expanded per run
    pub record: AuthoredRecord,
    pub rules: RuleSet,
    pub wait: PollPolicy,
    pub deadline: Duration,
}

impl ScenarioSpec {
    /// Check the structural requirements of a scenario
    pub fn validate(&self) -> Result<()> {
        if self.sessions.len() < 2 {
            return Err(Error::Config(format!(
                "Scenario '{}' needs an author and at least one peer session",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for session in &self.sessions {
            if !seen.insert(session.actor.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate actor '{}' in scenario '{}'",
                    session.actor, self.name
                )));
            }
        }
        if !seen.contains(self.author.as_str()) {
            return Err(Error::Config(format!(
                "Author '{}' is not one of the scenario sessions",
                self.author
            )));
        }
        if self.record.title.trim().is_empty() {
            return Err(Error::Config("Record title must not be empty".to_string()));
        }
        self.wait.validate()?;
        Ok(())
    }

    /// The record for one run, with a freshly generated id
    ///
    /// A title without an `{id}` placeholder gets `-<id>` appended, so every
    /// run authors a title no earlier run used.
    pub fn instantiate(&self) -> (String, AuthoredRecord) {
        let id = generate_id();
        let mut record = self.record.with_id(&id);
        if !self.record.title.contains(ID_PLACEHOLDER) {
            record.title = format!("{}-{}", record.title, id);
        }
        (id, record)
    }
}

impl ScenarioFile {
    /// Resolve against configuration defaults
    pub fn resolve(self, config: &Config) -> Result<(ScenarioSpec, PlatformSettings)> {
        let rules = match self.rules {
            Some(RulesSpec::Preset { preset }) => RuleSet::preset(&preset)?,
            Some(RulesSpec::Inline(rules)) => rules,
            None => RuleSet::preset(&config.defaults.rule_preset)?,
        };

        let deadline = self
            .deadline_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.timeouts.scenario_deadline());

        let spec = ScenarioSpec {
            name: self.name,
            workspace: self
                .workspace
                .unwrap_or_else(|| config.defaults.workspace.clone()),
            sessions: self.sessions,
            author: self.author,
            record: self.record,
            rules,
            wait: self.wait.apply(config.timeouts.poll_policy())?,
            deadline,
        };
        spec.validate()?;
        Ok((spec, self.platform))
    }
}

/// Load and parse a scenario file
pub fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    parse_scenario(&content)
}

/// Parse scenario YAML text
pub fn parse_scenario(content: &str) -> Result<ScenarioFile> {
    serde_yaml::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))
}
