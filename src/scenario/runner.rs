//! Scenario runner implementation
//!
//! Every session runs in its own task and owns its [`ActorSession`]
//! outright. Tasks report progress to the coordinator over an mpsc channel;
//! the coordinator moves them through the run with a `watch` stage channel.
//! No in-process state is shared between sessions.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::Instrument;

use crate::common::{Error, Result};
use crate::record::{AuthoredRecord, RecordHandle};
use crate::registry::tracker_ids;
use crate::sequencer::{ActionSequencer, SearchOutcome};
use crate::session::{ActorSession, SessionBackend};
use crate::transform::RuleSet;
use crate::verifier::{verify, MatchResult};
use crate::waiter::{wait_for, Observation, PollPolicy, Probe};

use super::config::ScenarioSpec;
use super::report::{Failure, Role, ScenarioResult, SessionReport, Step};

/// Where the run is; published by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    /// Sessions are opening and positioning on the baseline view
    Setup,
    /// Every session is ready; the author may create the record
    Author,
    /// The record exists; peers may look for it
    Verify(RecordHandle),
    Cancelled,
}

/// Messages from session tasks to the coordinator
#[derive(Debug)]
enum Event {
    Progress { actor: String, step: Step },
    /// Sent after the session has been released
    Finished {
        actor: String,
        outcome: Result<Outcome>,
    },
}

/// Terminal result of one session task
#[derive(Debug)]
enum Outcome {
    Authored,
    Verified(MatchResult),
    Cancelled,
}

/// Everything a session task needs, moved into the task
struct TaskContext {
    backend: Arc<dyn SessionBackend>,
    sequencer: ActionSequencer,
    actor: String,
    identity: crate::session::Identity,
    workspace: String,
    role: Role,
    record: Arc<AuthoredRecord>,
    rules: Arc<RuleSet>,
    wait: PollPolicy,
    events: mpsc::UnboundedSender<Event>,
    stage: watch::Receiver<Stage>,
}

impl TaskContext {
    fn progress(&self, step: Step) {
        let _ = self.events.send(Event::Progress {
            actor: self.actor.clone(),
            step,
        });
    }
}

/// Convergence probe: search the baseline list for one exact title
struct TitleSearch<'a> {
    sequencer: &'a ActionSequencer,
    session: &'a mut ActorSession,
    title: &'a str,
}

#[async_trait]
impl Observation for TitleSearch<'_> {
    type Output = RecordHandle;

    async fn probe(&mut self) -> Result<Probe<RecordHandle>> {
        Ok(match self.sequencer.search(self.session, self.title).await? {
            SearchOutcome::Found(handle) => Probe::Ready(handle),
            SearchOutcome::NotFound { candidates } => {
                Probe::Pending(format!("{} partial matches, no exact title", candidates))
            }
        })
    }
}

/// Wait until the stage satisfies `pick`; `None` once cancelled
async fn wait_stage<T>(
    stage: &mut watch::Receiver<Stage>,
    pick: impl Fn(&Stage) -> Option<T>,
) -> Option<T> {
    loop {
        {
            let current = stage.borrow_and_update();
            if *current == Stage::Cancelled {
                return None;
            }
            if let Some(value) = pick(&current) {
                return Some(value);
            }
        }
        if stage.changed().await.is_err() {
            return None;
        }
    }
}

/// Run the author or peer part of the scenario on an open session
async fn drive(ctx: &mut TaskContext, session: &mut ActorSession) -> Result<Outcome> {
    ctx.sequencer.open_module(session).await?;
    ctx.sequencer.open_baseline_view(session).await?;
    ctx.progress(Step::Ready);

    match ctx.role {
        Role::Author => {
            if wait_stage(&mut ctx.stage, |s| (*s == Stage::Author).then_some(()))
                .await
                .is_none()
            {
                return Ok(Outcome::Cancelled);
            }

            let handle = ctx.sequencer.create_record(session, &ctx.record).await?;
            ctx.progress(Step::Created {
                handle: handle.clone(),
            });

            // The author finds and opens its own record like any user would.
            match ctx.sequencer.search(session, &handle.title).await? {
                SearchOutcome::Found(found) => {
                    ctx.sequencer.open(session, &found).await?;
                    ctx.progress(Step::OpenedRecord);
                }
                SearchOutcome::NotFound { .. } => {
                    return Err(Error::action_rejected(
                        session.actor(),
                        "search",
                        format!("author cannot find its own record {}", handle),
                    ));
                }
            }
            Ok(Outcome::Authored)
        }
        Role::Peer => {
            let Some(target) = wait_stage(&mut ctx.stage, |s| match s {
                Stage::Verify(handle) => Some(handle.clone()),
                _ => None,
            })
            .await
            else {
                return Ok(Outcome::Cancelled);
            };

            let mut probe = TitleSearch {
                sequencer: &ctx.sequencer,
                session: &mut *session,
                title: &target.title,
            };
            let found = match wait_for(&ctx.wait, &mut probe).await? {
                Ok(found) => found,
                Err(timeout) => {
                    return Err(Error::ConvergenceTimeout {
                        actor: ctx.actor.clone(),
                        title: target.title.clone(),
                        waited: timeout.waited,
                        attempts: timeout.attempts,
                        last_observed: timeout.last_observed,
                    })
                }
            };
            ctx.progress(Step::Discovered {
                waited_ms: found.waited.as_millis() as u64,
                attempts: found.attempts,
            });

            ctx.sequencer.open(session, &found.value).await?;
            ctx.progress(Step::OpenedRecord);
            let observed = ctx.sequencer.read(session).await?;

            let result = verify(&ctx.record, &observed, &ctx.rules);
            ctx.progress(Step::Compared {
                fields: match &result {
                    MatchResult::Match { compared } => compared.len(),
                    MatchResult::Mismatch { compared, .. } => compared.len(),
                },
                matched: result.is_match(),
            });
            Ok(Outcome::Verified(result))
        }
    }
}

/// Body of one session task: open, drive, and always release
async fn session_task(mut ctx: TaskContext) {
    let mut cancel = ctx.stage.clone();
    let opening = {
        let backend = Arc::clone(&ctx.backend);
        let actor = ctx.actor.clone();
        let identity = ctx.identity.clone();
        let workspace = ctx.workspace.clone();
        async move { ActorSession::open(backend.as_ref(), &actor, identity, &workspace).await }
    };
    let mut opening = Box::pin(opening);

    let opened = tokio::select! {
        biased;
        opened = &mut opening => Some(opened),
        _ = wait_stage(&mut cancel, |_| None::<()>) => None,
    };

    let outcome = match opened {
        // Cancelled while the backend was still opening; whatever it opens
        // later is released in the background.
        None => {
            tracing::debug!("Cancelled while opening");
            tokio::spawn(
                async move {
                    if let Ok(session) = opening.await {
                        session.close().await;
                    }
                }
                .in_current_span(),
            );
            Ok(Outcome::Cancelled)
        }
        Some(Err(e)) => Err(e),
        Some(Ok(mut session)) => {
            ctx.progress(Step::Opened);
            let result = tokio::select! {
                result = drive(&mut ctx, &mut session) => result,
                _ = wait_stage(&mut cancel, |_| None::<()>) => Ok(Outcome::Cancelled),
            };
            session.close().await;
            result
        }
    };

    let _ = ctx.events.send(Event::Finished {
        actor: ctx.actor.clone(),
        outcome,
    });
}

/// Run a scenario to completion
///
/// Returns `Err` only for harness misconfiguration; every scenario outcome,
/// including timeouts and mismatches, is reported in the [`ScenarioResult`].
pub async fn run(backend: Arc<dyn SessionBackend>, spec: &ScenarioSpec) -> Result<ScenarioResult> {
    spec.validate()?;
    let sequencer = ActionSequencer::new(tracker_ids())?;
    let (run_id, record) = spec.instantiate();
    let record = Arc::new(record);
    let rules = Arc::new(spec.rules.clone());

    let span = tracing::info_span!("scenario", name = %spec.name, run = %run_id);
    async move {
        tracing::info!(
            sessions = spec.sessions.len(),
            rules = %rules.label(),
            title = %record.title,
            "Starting scenario"
        );

        let start = Instant::now();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (stage_tx, stage_rx) = watch::channel(Stage::Setup);

        let mut handles = Vec::with_capacity(spec.sessions.len());
        let mut reports: BTreeMap<String, SessionReport> = BTreeMap::new();
        for session in &spec.sessions {
            let role = if session.actor == spec.author {
                Role::Author
            } else {
                Role::Peer
            };
            reports.insert(session.actor.clone(), SessionReport::new(&session.actor, role));

            let ctx = TaskContext {
                backend: Arc::clone(&backend),
                sequencer: sequencer.clone(),
                actor: session.actor.clone(),
                identity: session.identity.clone(),
                workspace: spec.workspace.clone(),
                role,
                record: Arc::clone(&record),
                rules: Arc::clone(&rules),
                wait: spec.wait,
                events: events_tx.clone(),
                stage: stage_rx.clone(),
            };
            let task_span = tracing::info_span!("session", actor = %session.actor);
            handles.push(tokio::spawn(session_task(ctx).instrument(task_span)));
        }
        drop(events_tx);
        drop(stage_rx);

        let total = spec.sessions.len();
        let mut ready = HashSet::new();
        let mut finished = 0usize;
        let mut failure: Option<Failure> = None;
        // An unrepresentable deadline means the run is unbounded
        let mut deadline = start.checked_add(spec.deadline);

        let cancel = |stage_tx: &watch::Sender<Stage>| {
            stage_tx.send_replace(Stage::Cancelled);
        };

        while finished < total {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, events_rx.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        tracing::warn!(elapsed = ?start.elapsed(), "Scenario deadline exceeded");
                        deadline = None;
                        if failure.is_none() {
                            failure = Some(Failure::DeadlineExceeded {
                                elapsed_ms: elapsed_ms(start.elapsed()),
                                progress: reports
                                    .iter()
                                    .map(|(actor, r)| (actor.clone(), r.steps.clone()))
                                    .collect(),
                            });
                        }
                        cancel(&stage_tx);
                        continue;
                    }
                },
                None => events_rx.recv().await,
            };
            let Some(event) = next else {
                break;
            };

            match event {
                Event::Progress { actor, step } => {
                    match &step {
                        Step::Ready => {
                            ready.insert(actor.clone());
                            if ready.len() == total && *stage_tx.borrow() == Stage::Setup {
                                tracing::info!("All sessions on baseline view");
                                stage_tx.send_replace(Stage::Author);
                            }
                        }
                        Step::Created { handle } => {
                            if *stage_tx.borrow() == Stage::Author {
                                stage_tx.send_replace(Stage::Verify(handle.clone()));
                            }
                        }
                        _ => {}
                    }
                    if let Some(report) = reports.get_mut(&actor) {
                        report.steps.push(step);
                    }
                }
                Event::Finished { actor, outcome } => {
                    finished += 1;
                    let cancelled = *stage_tx.borrow() == Stage::Cancelled;
                    let report_failure = match &outcome {
                        Ok(Outcome::Verified(result @ MatchResult::Mismatch { .. })) => {
                            Some(Failure::from_mismatch(&actor, result))
                        }
                        Err(e) if !cancelled => Some(Failure::from_error(&actor, e)),
                        _ => None,
                    };
                    if let Some(report) = reports.get_mut(&actor) {
                        report.finish(&outcome_summary(&outcome));
                    }
                    if let Some(f) = report_failure {
                        if failure.is_none() {
                            tracing::warn!(actor = %actor, failure = %f, "Scenario failed");
                            failure = Some(f);
                        }
                        cancel(&stage_tx);
                    }
                }
            }
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                failure.get_or_insert(Failure::Session {
                    actor: "harness".to_string(),
                    code: "INTERNAL".to_string(),
                    message: format!("session task panicked: {}", e),
                });
            }
        }

        let result = ScenarioResult {
            name: spec.name.clone(),
            run_id,
            title: record.title.clone(),
            rules: rules.label(),
            passed: failure.is_none() && finished == total,
            elapsed_ms: elapsed_ms(start.elapsed()),
            sessions: reports.into_values().collect(),
            failure,
        };
        tracing::info!(passed = result.passed, elapsed_ms = result.elapsed_ms, "Scenario finished");
        Ok(result)
    }
    .instrument(span)
    .await
}

fn elapsed_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

fn outcome_summary(outcome: &Result<Outcome>) -> String {
    match outcome {
        Ok(Outcome::Authored) => "authored".to_string(),
        Ok(Outcome::Verified(MatchResult::Match { .. })) => "converged".to_string(),
        Ok(Outcome::Verified(MatchResult::Mismatch { field, .. })) => {
            format!("mismatch on {}", field)
        }
        Ok(Outcome::Cancelled) => "cancelled".to_string(),
        Err(e) => format!("error: {}", e),
    }
}
