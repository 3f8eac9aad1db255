//! Scenario results and their presentation

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::common::Error;
use crate::record::{Field, RecordHandle};
use crate::verifier::MatchResult;

/// Part a session plays in a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Peer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Author => write!(f, "author"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

/// Milestones a session reaches, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Opened,
    /// Positioned on the baseline list view
    Ready,
    Created {
        handle: RecordHandle,
    },
    Discovered {
        waited_ms: u64,
        attempts: u32,
    },
    OpenedRecord,
    Compared {
        fields: usize,
        matched: bool,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Opened => write!(f, "Session opened"),
            Step::Ready => write!(f, "On baseline view"),
            Step::Created { handle } => write!(f, "Created {}", handle),
            Step::Discovered {
                waited_ms,
                attempts,
            } => write!(
                f,
                "Record visible after {}ms ({} attempts)",
                waited_ms, attempts
            ),
            Step::OpenedRecord => write!(f, "Opened record"),
            Step::Compared { fields, matched } => {
                if *matched {
                    write!(f, "All {} fields match", fields)
                } else {
                    write!(f, "Mismatch after {} matching fields", fields)
                }
            }
        }
    }
}

/// What one session did
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub actor: String,
    pub role: Role,
    pub steps: Vec<Step>,
    /// Terminal outcome, set when the session task finished
    pub outcome: Option<String>,
}

impl SessionReport {
    pub fn new(actor: &str, role: Role) -> Self {
        Self {
            actor: actor.to_string(),
            role,
            steps: Vec::new(),
            outcome: None,
        }
    }

    pub fn finish(&mut self, outcome: &str) {
        self.outcome = Some(outcome.to_string());
    }
}

/// Why a scenario failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// A session could not navigate or an action was refused
    Session {
        actor: String,
        code: String,
        message: String,
    },
    ConvergenceTimeout {
        actor: String,
        title: String,
        waited_ms: u64,
        attempts: u32,
        last_observed: String,
    },
    Mismatch {
        actor: String,
        field: Field,
        authored: String,
        expected: String,
        observed: String,
        compared: Vec<Field>,
    },
    DeadlineExceeded {
        elapsed_ms: u64,
        /// Steps each session had reached
        progress: BTreeMap<String, Vec<Step>>,
    },
}

impl Failure {
    pub fn from_error(actor: &str, error: &Error) -> Self {
        match error {
            Error::ConvergenceTimeout {
                actor,
                title,
                waited,
                attempts,
                last_observed,
            } => Failure::ConvergenceTimeout {
                actor: actor.clone(),
                title: title.clone(),
                waited_ms: waited.as_millis() as u64,
                attempts: *attempts,
                last_observed: last_observed.clone(),
            },
            other => Failure::Session {
                actor: actor.to_string(),
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn from_mismatch(actor: &str, result: &MatchResult) -> Self {
        match result {
            MatchResult::Mismatch {
                field,
                authored,
                expected,
                observed,
                compared,
            } => Failure::Mismatch {
                actor: actor.to_string(),
                field: *field,
                authored: authored.clone(),
                expected: expected.clone(),
                observed: observed.clone(),
                compared: compared.clone(),
            },
            MatchResult::Match { .. } => Failure::Session {
                actor: actor.to_string(),
                code: "INTERNAL".to_string(),
                message: "matching result reported as a mismatch".to_string(),
            },
        }
    }

    /// Stable machine-readable failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::Session { .. } => "session",
            Failure::ConvergenceTimeout { .. } => "convergence_timeout",
            Failure::Mismatch { .. } => "mismatch",
            Failure::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Session {
                actor,
                code,
                message,
            } => write!(f, "[{}] {}: {}", actor, code, message),
            Failure::ConvergenceTimeout {
                actor,
                title,
                waited_ms,
                attempts,
                last_observed,
            } => write!(
                f,
                "[{}] '{}' not visible after {}ms ({} attempts, last saw: {})",
                actor, title, waited_ms, attempts, last_observed
            ),
            Failure::Mismatch {
                actor,
                field,
                authored,
                expected,
                observed,
                ..
            } => write!(
                f,
                "[{}] field '{}': expected '{}' (authored '{}'), observed '{}'",
                actor, field, expected, authored, observed
            ),
            Failure::DeadlineExceeded { elapsed_ms, .. } => {
                write!(f, "scenario deadline exceeded after {}ms", elapsed_ms)
            }
        }
    }
}

/// Result of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    /// Generated id that tags this run's record
    pub run_id: String,
    /// Title of the record authored in this run
    pub title: String,
    /// Rule set label, `name@vN`
    pub rules: String,
    pub passed: bool,
    pub elapsed_ms: u64,
    pub sessions: Vec<SessionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ScenarioResult {
    /// Print a human-readable report to stdout
    pub fn print(&self, verbose: bool) {
        println!(
            "\n{} {}",
            "Scenario:".blue().bold(),
            self.name.white().bold()
        );
        println!("  Run:    {}", self.run_id.dimmed());
        println!("  Record: {}", self.title.dimmed());
        println!("  Rules:  {}", self.rules.dimmed());

        println!("\n{}", "Sessions:".cyan());
        for session in &self.sessions {
            let failed = self.failure_actor() == Some(session.actor.as_str());
            let mark = if failed { "✗".red() } else { "✓".green() };
            println!(
                "  {} {} ({}) {}",
                mark,
                session.actor.white().bold(),
                session.role,
                session.outcome.as_deref().unwrap_or("unfinished").dimmed()
            );
            if verbose {
                for step in &session.steps {
                    println!("      {}", step.to_string().dimmed());
                }
            }
        }

        match &self.failure {
            None => println!(
                "\n{} {} {}\n",
                "✓".green().bold(),
                "Scenario Passed".green().bold(),
                format!("({}ms)", self.elapsed_ms).dimmed()
            ),
            Some(failure) => {
                println!("\n  {} {}", "✗".red(), failure);
                if let Failure::Mismatch { compared, .. } = failure {
                    if !compared.is_empty() {
                        let names: Vec<&str> = compared.iter().map(|f| f.name()).collect();
                        println!("    matched before: {}", names.join(", ").dimmed());
                    }
                }
                println!(
                    "\n{} {} {}\n",
                    "✗".red().bold(),
                    "Scenario Failed".red().bold(),
                    format!("({}ms)", self.elapsed_ms).dimmed()
                );
            }
        }
    }

    fn failure_actor(&self) -> Option<&str> {
        match self.failure.as_ref()? {
            Failure::Session { actor, .. }
            | Failure::ConvergenceTimeout { actor, .. }
            | Failure::Mismatch { actor, .. } => Some(actor.as_str()),
            Failure::DeadlineExceeded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_error_becomes_timeout_failure() {
        let err = Error::ConvergenceTimeout {
            actor: "peer".into(),
            title: "Collaborative test for issue-x".into(),
            waited: Duration::from_millis(1500),
            attempts: 4,
            last_observed: "0 partial matches, no exact title".into(),
        };
        let failure = Failure::from_error("peer", &err);
        assert_eq!(failure.kind(), "convergence_timeout");
        assert!(failure.to_string().contains("1500ms"));
    }

    #[test]
    fn test_other_errors_keep_their_code() {
        let err = Error::navigation("peer", "http://localhost/workbench/x", "unknown workspace");
        match Failure::from_error("peer", &err) {
            Failure::Session { code, actor, .. } => {
                assert_eq!(code, err.code());
                assert_eq!(actor, "peer");
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }

    #[test]
    fn test_result_json_shape() {
        let result = ScenarioResult {
            name: "assign".into(),
            run_id: "abc".into(),
            title: "Collaborative test for issue-abc".into(),
            rules: "tracker-v1@v1".into(),
            passed: false,
            elapsed_ms: 12,
            sessions: vec![SessionReport::new("peer", Role::Peer)],
            failure: Some(Failure::Mismatch {
                actor: "peer".into(),
                field: Field::Milestone,
                authored: "No Milestone".into(),
                expected: "Milestone".into(),
                observed: "No Milestone".into(),
                compared: vec![Field::Title],
            }),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failure"]["kind"], "mismatch");
        assert_eq!(json["failure"]["field"], "milestone");
        assert_eq!(json["sessions"][0]["role"], "peer");
        assert_eq!(json["run_id"], "abc");
    }

    #[test]
    fn test_step_display() {
        let step = Step::Discovered {
            waited_ms: 750,
            attempts: 3,
        };
        assert_eq!(step.to_string(), "Record visible after 750ms (3 attempts)");
    }
}
