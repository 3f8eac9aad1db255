//! Error types for the collaboration harness
//!
//! Every error names the actor and the step it came from so that a failed
//! run can be diagnosed from the report alone, without re-running it.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error("[{actor}] could not reach '{target}': {reason}")]
    Navigation {
        actor: String,
        target: String,
        reason: String,
    },

    #[error("[{actor}] cannot {action} while in {actual}; requires {required}")]
    Precondition {
        actor: String,
        action: String,
        required: String,
        actual: String,
    },

    #[error("[{actor}] backend rejected {action}: {reason}")]
    ActionRejected {
        actor: String,
        action: String,
        reason: String,
    },

    // === Convergence Errors ===
    #[error(
        "[{actor}] record '{title}' not visible after {:.1}s ({attempts} polls); last observed: {last_observed}",
        waited.as_secs_f64()
    )]
    ConvergenceTimeout {
        actor: String,
        title: String,
        waited: Duration,
        attempts: u32,
        last_observed: String,
    },

    #[error("Search for '{title}' matched {count} records; titles must be unique within a run")]
    AmbiguousMatch { title: String, count: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a navigation error
    pub fn navigation(actor: &str, target: &str, reason: impl Into<String>) -> Self {
        Self::Navigation {
            actor: actor.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(actor: &str, action: &str, required: &str, actual: &str) -> Self {
        Self::Precondition {
            actor: actor.to_string(),
            action: action.to_string(),
            required: required.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an action rejected error
    pub fn action_rejected(actor: &str, action: &str, reason: impl Into<String>) -> Self {
        Self::ActionRejected {
            actor: actor.to_string(),
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable code used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::Navigation { .. } => "NAVIGATION",
            Error::Precondition { .. } => "PRECONDITION",
            Error::ActionRejected { .. } => "ACTION_REJECTED",
            Error::ConvergenceTimeout { .. } => "CONVERGENCE_TIMEOUT",
            Error::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::Io(_) | Error::FileRead { .. } => "IO",
            Error::Json(_) | Error::Yaml(_) => "SERIALIZATION",
            Error::Internal(_) => "INTERNAL",
        }
    }
}
