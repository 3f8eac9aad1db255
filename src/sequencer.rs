//! Ordered domain actions against one session
//!
//! The sequencer borrows its session mutably for every step, so two steps
//! on the same session can never overlap. View preconditions are checked
//! locally before anything is sent to the backend.

use crate::common::{Error, Result};
use crate::record::{AuthoredRecord, ObservedRecord, RecordHandle};
use crate::registry::IdRegistry;
use crate::session::{Action, ActionOutcome, ActorSession, Location, ViewHandle};

/// List mode that shows every record regardless of status
pub const MODE_ALL: &str = "all";

/// Result of a title search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(RecordHandle),
    NotFound { candidates: usize },
}

/// Navigation targets resolved from the id registry
#[derive(Debug, Clone)]
pub struct ActionSequencer {
    app: String,
    viewlet: String,
}

impl ActionSequencer {
    /// Build a sequencer for the tracker module
    pub fn new(ids: &IdRegistry) -> Result<Self> {
        Ok(Self {
            app: ids.require("app.Tracker")?.to_string(),
            viewlet: ids.require("viewlet.IssueList")?.to_string(),
        })
    }

    fn baseline(&self) -> Location {
        Location::Collection {
            app: self.app.clone(),
            viewlet: self.viewlet.clone(),
            mode: MODE_ALL.to_string(),
        }
    }

    fn unexpected(session: &ActorSession, action: &str, outcome: ActionOutcome) -> Error {
        Error::Internal(format!(
            "[{}] unexpected outcome for {}: {:?}",
            session.actor(),
            action,
            outcome
        ))
    }

    /// Open the record-collection module
    pub async fn open_module(&self, session: &mut ActorSession) -> Result<()> {
        session
            .perform(Action::OpenApp {
                app: self.app.clone(),
            })
            .await?;
        session.set_location(Location::Module {
            app: self.app.clone(),
        });
        Ok(())
    }

    /// Open the "all issues" list with the default viewlet
    pub async fn open_baseline_view(&self, session: &mut ActorSession) -> Result<()> {
        self.require_module(session, "open all issues")?;
        session
            .perform(Action::OpenView {
                viewlet: self.viewlet.clone(),
                mode: MODE_ALL.to_string(),
            })
            .await?;
        session.set_location(self.baseline());
        Ok(())
    }

    /// Create a record and leave the session on the baseline view
    #[tracing::instrument(skip_all, fields(actor = %session.actor(), title = %record.title))]
    pub async fn create_record(
        &self,
        session: &mut ActorSession,
        record: &AuthoredRecord,
    ) -> Result<RecordHandle> {
        self.require_module(session, "create record")?;

        let outcome = session
            .perform(Action::CreateRecord(Box::new(record.clone())))
            .await?;
        let handle = match outcome {
            ActionOutcome::Created(handle) => handle,
            other => return Err(Self::unexpected(session, "create record", other)),
        };
        tracing::info!(record = %handle, "Record created");

        // Creating from a list collapses it; reopen so search works next.
        self.open_baseline_view(session).await?;
        Ok(handle)
    }

    /// Search the baseline list for an exact title
    pub async fn search(&self, session: &mut ActorSession, title: &str) -> Result<SearchOutcome> {
        if session.view().location != self.baseline() {
            return Err(Error::precondition(
                session.actor(),
                "search",
                &self.baseline().to_string(),
                &session.view().location.to_string(),
            ));
        }

        let outcome = session
            .perform(Action::Search {
                title: title.to_string(),
            })
            .await?;
        let candidates = match outcome {
            ActionOutcome::NotFound => Vec::new(),
            ActionOutcome::Matches(matches) => matches,
            other => return Err(Self::unexpected(session, "search", other)),
        };

        let total = candidates.len();
        let mut exact: Vec<RecordHandle> =
            candidates.into_iter().filter(|h| h.title == title).collect();
        match exact.len() {
            0 => Ok(SearchOutcome::NotFound { candidates: total }),
            1 => Ok(SearchOutcome::Found(exact.remove(0))),
            count => Err(Error::AmbiguousMatch {
                title: title.to_string(),
                count,
            }),
        }
    }

    /// Open a record's details view
    pub async fn open(&self, session: &mut ActorSession, handle: &RecordHandle) -> Result<ViewHandle> {
        self.require_module(session, "open record")?;
        match session.perform(Action::OpenRecord(handle.clone())).await? {
            ActionOutcome::Opened(view) => {
                session.set_location(Location::Record {
                    app: self.app.clone(),
                    view: view.clone(),
                });
                Ok(view)
            }
            ActionOutcome::NotFound => Err(Error::action_rejected(
                session.actor(),
                "open record",
                format!("{} is not visible", handle),
            )),
            other => Err(Self::unexpected(session, "open record", other)),
        }
    }

    /// Read the record shown in the session's current details view
    pub async fn read(&self, session: &mut ActorSession) -> Result<ObservedRecord> {
        let view = match &session.view().location {
            Location::Record { view, .. } => view.clone(),
            other => {
                return Err(Error::precondition(
                    session.actor(),
                    "read record",
                    "record details view",
                    &other.to_string(),
                ))
            }
        };
        session.read_state(&view).await
    }

    fn require_module(&self, session: &ActorSession, action: &str) -> Result<()> {
        match session.view().location.app() {
            Some(app) if app == self.app => Ok(()),
            _ => Err(Error::precondition(
                session.actor(),
                action,
                &format!("module {}", self.app),
                &session.view().location.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::new_issue;
    use crate::registry::tracker_ids;
    use crate::session::Identity;
    use crate::sim::{PlatformSettings, SimulatedPlatform};

    const URI: &str = "http://localhost:8083/workbench/sanity-ws/tracker/";

    async fn open(platform: &SimulatedPlatform, actor: &str) -> ActorSession {
        ActorSession::open(platform, actor, Identity::from(actor), URI)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_requires_baseline_view() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "author").await;

        let err = seq.search(&mut session, "anything").await.unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));

        seq.open_module(&mut session).await.unwrap();
        let err = seq.search(&mut session, "anything").await.unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));

        session.close().await;
    }

    #[tokio::test]
    async fn test_create_requires_module() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "author").await;
        let err = seq
            .create_record(&mut session, &new_issue("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition { ref action, .. } if action == "create record"));
        assert_eq!(platform.records_titled(&new_issue("p").title), 0);
        session.close().await;
    }

    #[tokio::test]
    async fn test_create_leaves_session_searchable() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "author").await;
        seq.open_module(&mut session).await.unwrap();

        let record = new_issue("c1");
        let handle = seq.create_record(&mut session, &record).await.unwrap();
        assert_eq!(handle.title, record.title);

        let found = seq.search(&mut session, &record.title).await.unwrap();
        assert_eq!(found, SearchOutcome::Found(handle.clone()));

        seq.open(&mut session, &handle).await.unwrap();
        let observed = seq.read(&mut session).await.unwrap();
        assert_eq!(observed.title, record.title);
        session.close().await;
    }

    #[tokio::test]
    async fn test_prefix_titles_do_not_match_exactly() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "author").await;
        seq.open_module(&mut session).await.unwrap();

        let mut longer = new_issue("x");
        longer.title = "T-abc-extended".into();
        seq.create_record(&mut session, &longer).await.unwrap();

        let outcome = seq.search(&mut session, "T-abc").await.unwrap();
        assert_eq!(outcome, SearchOutcome::NotFound { candidates: 1 });
        session.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_titles_are_ambiguous() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "author").await;
        seq.open_module(&mut session).await.unwrap();

        let record = new_issue("dup");
        seq.create_record(&mut session, &record).await.unwrap();
        seq.create_record(&mut session, &record).await.unwrap();

        let err = seq.search(&mut session, &record.title).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { count: 2, .. }));
        session.close().await;
    }

    #[tokio::test]
    async fn test_read_requires_open_record() {
        let platform = SimulatedPlatform::new(PlatformSettings::default());
        let seq = ActionSequencer::new(tracker_ids()).unwrap();
        let mut session = open(&platform, "peer").await;
        let err = seq.read(&mut session).await.unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));
        session.close().await;
        assert_eq!(platform.leaked_sessions(), 0);
    }
}
