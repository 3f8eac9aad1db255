//! Simulated platform state and session clients

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::record::{AuthoredRecord, ObservedRecord, RecordHandle};
use crate::registry::tracker_ids;
use crate::session::{
    Action, ActionOutcome, BackendError, Identity, SessionBackend, SessionClient, ViewHandle,
    ViewState,
};

/// Milestone value the new-issue form uses for "no milestone selected"
const NO_MILESTONE: &str = "No Milestone";

/// Settings of the simulated platform
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSettings {
    /// Workspace id reachable at `.../workbench/<workspace>`
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Identities allowed to log in; empty means everyone
    #[serde(default)]
    pub authorized: Vec<Identity>,

    /// Delay before a record becomes visible to sessions other than its author
    #[serde(default = "default_latency")]
    pub replication_latency_ms: u64,

    /// Unit appended to bare-numeric estimations
    #[serde(default = "default_estimation_unit")]
    pub estimation_unit: String,

    /// Milestone the default project assigns when none is selected
    #[serde(default = "default_milestone")]
    pub default_milestone: Option<String>,

    /// Labels that exist before the run
    #[serde(default)]
    pub known_labels: Vec<String>,
}

fn default_workspace() -> String {
    "sanity-ws".to_string()
}
fn default_latency() -> u64 {
    500
}
fn default_estimation_unit() -> String {
    "h".to_string()
}
fn default_milestone() -> Option<String> {
    Some("Milestone".to_string())
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            authorized: Vec::new(),
            replication_latency_ms: default_latency(),
            estimation_unit: default_estimation_unit(),
            default_milestone: default_milestone(),
            known_labels: Vec::new(),
        }
    }
}

struct StoredRecord {
    id: String,
    author_session: u64,
    created_at: Instant,
    record: ObservedRecord,
}

#[derive(Default)]
struct State {
    next_session: u64,
    next_record: u64,
    records: Vec<StoredRecord>,
    labels: BTreeSet<String>,
    /// Session id -> released
    sessions: HashMap<u64, bool>,
    double_releases: usize,
}

struct Inner {
    settings: PlatformSettings,
    state: Mutex<State>,
}

/// Shared simulated backend; cheap to clone
#[derive(Clone)]
pub struct SimulatedPlatform {
    inner: Arc<Inner>,
}

impl SimulatedPlatform {
    pub fn new(settings: PlatformSettings) -> Self {
        let state = State {
            labels: settings.known_labels.iter().cloned().collect(),
            ..State::default()
        };
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.inner.settings.replication_latency_ms)
    }

    /// Sessions ever opened
    pub fn opened_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Sessions opened but not yet released
    pub fn leaked_sessions(&self) -> usize {
        self.state().sessions.values().filter(|released| !**released).count()
    }

    /// Release calls on sessions that were already released
    pub fn double_releases(&self) -> usize {
        self.state().double_releases
    }

    /// Number of stored records whose title is exactly `title`
    pub fn records_titled(&self, title: &str) -> usize {
        self.state()
            .records
            .iter()
            .filter(|r| r.record.title == title)
            .count()
    }

    /// Apply the platform's normalization to an authored record
    fn normalize(&self, authored: &AuthoredRecord, labels: &mut BTreeSet<String>) -> ObservedRecord {
        let settings = &self.inner.settings;
        let mut record = ObservedRecord::from(authored);

        let estimation = authored.estimation.trim();
        if estimation.parse::<f64>().is_ok() {
            record.estimation = format!("{}{}", estimation, settings.estimation_unit);
        }

        if authored.milestone == NO_MILESTONE {
            if let Some(default) = &settings.default_milestone {
                record.milestone = default.clone();
            }
        }

        if authored.create_label {
            labels.extend(authored.labels.iter().cloned());
        }
        record.labels = authored
            .labels
            .iter()
            .filter(|l| labels.contains(*l))
            .cloned()
            .collect();

        record
    }

    fn workspace_of(uri: &str) -> Option<&str> {
        let (_, rest) = uri.split_once("workbench/")?;
        rest.split('/').next().filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl SessionBackend for SimulatedPlatform {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn SessionClient>, BackendError> {
        let authorized = &self.inner.settings.authorized;
        if !authorized.is_empty() && !authorized.contains(identity) {
            return Err(BackendError::Unauthorized(identity.to_string()));
        }

        let id = {
            let mut state = self.state();
            state.next_session += 1;
            let id = state.next_session;
            state.sessions.insert(id, false);
            id
        };

        tracing::trace!(session = id, identity = %identity, "Simulated session connected");

        Ok(Box::new(SimSession {
            id,
            platform: self.clone(),
            app: None,
            in_list: false,
        }))
    }
}

/// One client of the simulated platform
struct SimSession {
    id: u64,
    platform: SimulatedPlatform,
    app: Option<String>,
    in_list: bool,
}

impl SimSession {
    fn ensure_live(&self) -> Result<(), BackendError> {
        match self.platform.state().sessions.get(&self.id) {
            Some(false) => Ok(()),
            _ => Err(BackendError::Released),
        }
    }

    fn visible(&self, record: &StoredRecord, now: Instant) -> bool {
        record.author_session == self.id || now >= record.created_at + self.platform.latency()
    }
}

#[async_trait]
impl SessionClient for SimSession {
    async fn navigate(&mut self, uri: &str) -> Result<ViewState, BackendError> {
        self.ensure_live()?;
        match SimulatedPlatform::workspace_of(uri) {
            Some(ws) if ws == self.platform.inner.settings.workspace => {
                self.app = None;
                self.in_list = false;
                Ok(ViewState {
                    uri: uri.to_string(),
                })
            }
            Some(ws) => Err(BackendError::Unreachable(format!("unknown workspace '{}'", ws))),
            None => Err(BackendError::Unreachable(format!("not a workbench uri: {}", uri))),
        }
    }

    async fn perform(&mut self, action: Action) -> Result<ActionOutcome, BackendError> {
        self.ensure_live()?;
        let ids = tracker_ids();

        match action {
            Action::OpenApp { app } => {
                if !ids.contains_id(&app) {
                    return Err(BackendError::Unreachable(format!("no application '{}'", app)));
                }
                self.app = Some(app);
                self.in_list = false;
                Ok(ActionOutcome::Done)
            }
            Action::OpenView { viewlet, .. } => {
                if self.app.is_none() {
                    return Err(BackendError::Rejected("no application open".into()));
                }
                if !ids.contains_id(&viewlet) {
                    return Err(BackendError::Unreachable(format!("no viewlet '{}'", viewlet)));
                }
                self.in_list = true;
                Ok(ActionOutcome::Done)
            }
            Action::CreateRecord(authored) => {
                if self.app.is_none() {
                    return Err(BackendError::Rejected("no application open".into()));
                }
                let mut state = self.platform.state();
                let mut labels = std::mem::take(&mut state.labels);
                let record = self.platform.normalize(&authored, &mut labels);
                state.labels = labels;
                state.next_record += 1;
                let id = format!("TSK-{}", state.next_record);
                state.records.push(StoredRecord {
                    id: id.clone(),
                    author_session: self.id,
                    created_at: Instant::now(),
                    record,
                });
                Ok(ActionOutcome::Created(RecordHandle {
                    id,
                    title: authored.title.clone(),
                }))
            }
            Action::Search { title } => {
                if !self.in_list {
                    return Err(BackendError::Rejected("search box is not visible".into()));
                }
                let now = Instant::now();
                let state = self.platform.state();
                let matches: Vec<RecordHandle> = state
                    .records
                    .iter()
                    .filter(|r| self.visible(r, now) && r.record.title.contains(&title))
                    .map(|r| RecordHandle {
                        id: r.id.clone(),
                        title: r.record.title.clone(),
                    })
                    .collect();
                if matches.is_empty() {
                    Ok(ActionOutcome::NotFound)
                } else {
                    Ok(ActionOutcome::Matches(matches))
                }
            }
            Action::OpenRecord(handle) => {
                let now = Instant::now();
                let state = self.platform.state();
                let found = state
                    .records
                    .iter()
                    .any(|r| r.id == handle.id && self.visible(r, now));
                if found {
                    self.in_list = false;
                    Ok(ActionOutcome::Opened(ViewHandle {
                        record_id: handle.id,
                    }))
                } else {
                    Ok(ActionOutcome::NotFound)
                }
            }
        }
    }

    async fn read_state(&mut self, view: &ViewHandle) -> Result<ObservedRecord, BackendError> {
        self.ensure_live()?;
        let now = Instant::now();
        let state = self.platform.state();
        state
            .records
            .iter()
            .find(|r| r.id == view.record_id && self.visible(r, now))
            .map(|r| r.record.clone())
            .ok_or_else(|| BackendError::Rejected(format!("record {} not found", view.record_id)))
    }

    async fn release(&mut self) {
        let mut state = self.platform.state();
        match state.sessions.get_mut(&self.id) {
            Some(released) if !*released => *released = true,
            _ => state.double_releases += 1,
        }
    }
}
