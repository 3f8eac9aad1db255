//! Session capability surface
//!
//! The harness never talks to a transport directly. A backend hands out one
//! [`SessionClient`] per identity, and every client exposes the same three
//! capabilities: navigate, perform an action, and read a record's state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::record::{AuthoredRecord, ObservedRecord, RecordHandle};

/// Opaque login identity of one actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity(s.to_string())
    }
}

/// Errors reported by a backend, before the harness attaches actor context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("session already released")]
    Released,
}

/// A view the backend reports as ready after navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub uri: String,
}

/// Handle to an opened record details view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewHandle {
    pub record_id: String,
}

/// A discrete domain action
#[derive(Debug, Clone)]
pub enum Action {
    /// Open an application module, e.g. `tracker:app:Tracker`
    OpenApp { app: String },
    /// Select a viewlet and a list mode inside the current module
    OpenView { viewlet: String, mode: String },
    /// Fill and submit the new-record form
    CreateRecord(Box<AuthoredRecord>),
    /// Type into the search box of the current list view
    Search { title: String },
    /// Open a record's details view
    OpenRecord(RecordHandle),
}

impl Action {
    /// Short name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Action::OpenApp { .. } => "open app",
            Action::OpenView { .. } => "open view",
            Action::CreateRecord(_) => "create record",
            Action::Search { .. } => "search",
            Action::OpenRecord(_) => "open record",
        }
    }
}

/// What an action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Created(RecordHandle),
    Matches(Vec<RecordHandle>),
    Opened(ViewHandle),
    NotFound,
}

/// One isolated client session with its own auth and view state
#[async_trait]
pub trait SessionClient: Send {
    async fn navigate(&mut self, uri: &str) -> Result<ViewState, BackendError>;

    async fn perform(&mut self, action: Action) -> Result<ActionOutcome, BackendError>;

    /// Read-only snapshot of an opened record
    async fn read_state(&mut self, view: &ViewHandle) -> Result<ObservedRecord, BackendError>;

    /// Release the session; called exactly once by the owner
    async fn release(&mut self);
}

/// Hands out independent sessions against one shared platform
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn SessionClient>, BackendError>;
}
