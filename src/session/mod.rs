//! Actor sessions
//!
//! An [`ActorSession`] is one simulated user: its own identity, its own
//! backend client and its own view context. It is owned by exactly one task
//! and released exactly once through [`ActorSession::close`].

mod backend;

pub use backend::{
    Action, ActionOutcome, BackendError, Identity, SessionBackend, SessionClient, ViewHandle,
    ViewState,
};

use std::fmt;

use crate::common::{Error, Result};
use crate::record::ObservedRecord;

/// Where a session's view currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Workspace root, no module selected
    Workspace,
    /// Inside an application module
    Module { app: String },
    /// A list view inside a module
    Collection {
        app: String,
        viewlet: String,
        mode: String,
    },
    /// A record details view inside a module
    Record { app: String, view: ViewHandle },
}

impl Location {
    /// Module the view is in, if any
    pub fn app(&self) -> Option<&str> {
        match self {
            Location::Workspace => None,
            Location::Module { app }
            | Location::Collection { app, .. }
            | Location::Record { app, .. } => Some(app),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Workspace => write!(f, "workspace root"),
            Location::Module { app } => write!(f, "module {}", app),
            Location::Collection { viewlet, mode, .. } => write!(f, "{} ({})", viewlet, mode),
            Location::Record { view, .. } => write!(f, "record {}", view.record_id),
        }
    }
}

/// Persistent view context of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    pub workspace: String,
    pub location: Location,
}

/// One independent, isolated client session
pub struct ActorSession {
    actor: String,
    identity: Identity,
    client: Box<dyn SessionClient>,
    view: ViewContext,
    released: bool,
}

impl ActorSession {
    /// Connect a fresh client for `identity` and open `workspace_uri`
    #[tracing::instrument(skip(backend, identity), fields(identity = %identity))]
    pub async fn open(
        backend: &dyn SessionBackend,
        actor: &str,
        identity: Identity,
        workspace_uri: &str,
    ) -> Result<Self> {
        let mut client = backend
            .connect(&identity)
            .await
            .map_err(|e| Error::navigation(actor, workspace_uri, e.to_string()))?;

        if let Err(e) = client.navigate(workspace_uri).await {
            // The session never became usable, but it still holds a backend slot.
            client.release().await;
            return Err(Error::navigation(actor, workspace_uri, e.to_string()));
        }

        tracing::debug!("Session opened");

        Ok(Self {
            actor: actor.to_string(),
            identity,
            client,
            view: ViewContext {
                workspace: workspace_uri.to_string(),
                location: Location::Workspace,
            },
            released: false,
        })
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn view(&self) -> &ViewContext {
        &self.view
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.view.location = location;
    }

    /// Perform an action; backend failures become actor-tagged errors
    pub(crate) async fn perform(&mut self, action: Action) -> Result<ActionOutcome> {
        let kind = action.kind();
        tracing::debug!(actor = %self.actor, action = kind, "Performing action");
        self.client.perform(action).await.map_err(|e| match e {
            BackendError::Unreachable(reason) | BackendError::Unauthorized(reason) => {
                Error::navigation(&self.actor, kind, reason)
            }
            other => Error::action_rejected(&self.actor, kind, other.to_string()),
        })
    }

    /// Read an opened record
    pub(crate) async fn read_state(&mut self, view: &ViewHandle) -> Result<ObservedRecord> {
        self.client
            .read_state(view)
            .await
            .map_err(|e| Error::action_rejected(&self.actor, "read record", e.to_string()))
    }

    /// Release the backend session
    pub async fn close(mut self) {
        self.client.release().await;
        self.released = true;
        tracing::debug!(actor = %self.actor, "Session released");
    }
}

impl fmt::Debug for ActorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSession")
            .field("actor", &self.actor)
            .field("identity", &self.identity)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl Drop for ActorSession {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(actor = %self.actor, "Session dropped without being closed");
        }
    }
}
