//! End-to-end scenario tests against the simulated platform
//!
//! Scenarios run under a paused tokio clock, so replication latency and
//! convergence timeouts are exercised deterministically and instantly.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collab_harness::common::config::Config;
use collab_harness::record::Field;
use collab_harness::scenario::{self, Failure, Role, ScenarioSpec, SessionSpec, Step};
use collab_harness::session::{BackendError, Identity, SessionBackend, SessionClient};
use collab_harness::sim::{PlatformSettings, SimulatedPlatform};
use collab_harness::transform::RuleSet;
use collab_harness::Error;

const FIXTURE: &str = include_str!("fixtures/issue_assignment.yaml");

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("issue_assignment.yaml")
}

/// The assignment scenario with its platform settings
fn assignment() -> (ScenarioSpec, PlatformSettings) {
    scenario::parse_scenario(FIXTURE)
        .expect("fixture parses")
        .resolve(&Config::default())
        .expect("fixture resolves")
}

fn with_latency(mut settings: PlatformSettings, ms: u64) -> PlatformSettings {
    settings.replication_latency_ms = ms;
    settings
}

/// Simulated platform whose `connect` never completes for one identity
struct StuckConnect {
    platform: SimulatedPlatform,
    stuck: Identity,
}

#[async_trait]
impl SessionBackend for StuckConnect {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn SessionClient>, BackendError> {
        if *identity == self.stuck {
            std::future::pending::<()>().await;
        }
        self.platform.connect(identity).await
    }
}

fn assert_clean_teardown(platform: &SimulatedPlatform) {
    assert_eq!(platform.leaked_sessions(), 0, "sessions left open");
    assert_eq!(platform.double_releases(), 0, "sessions released twice");
}

#[tokio::test(start_paused = true)]
async fn test_peer_observes_normalized_record() {
    let (spec, settings) = assignment();
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(result.passed, "unexpected failure: {:?}", result.failure);
    assert!(result.failure.is_none());
    assert_eq!(result.rules, "tracker-v1@v1");
    assert!(result.title.starts_with("Collaborative test for issue-"));
    assert!(!result.title.contains("{id}"));

    let peer = result
        .sessions
        .iter()
        .find(|s| s.role == Role::Peer)
        .unwrap();
    assert_eq!(peer.outcome.as_deref(), Some("converged"));
    assert!(peer.steps.contains(&Step::Compared {
        fields: Field::ALL.len(),
        matched: true
    }));
    // Visible only after the 750ms replication latency
    let waited = peer.steps.iter().find_map(|s| match s {
        Step::Discovered { waited_ms, .. } => Some(*waited_ms),
        _ => None,
    });
    assert!(waited.unwrap() >= 750);

    assert_eq!(platform.opened_sessions(), 2);
    assert_eq!(platform.records_titled(&result.title), 1);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_every_peer_converges() {
    let (mut spec, settings) = assignment();
    spec.sessions.push(SessionSpec {
        actor: "reviewer".into(),
        identity: Identity::from("user3"),
    });
    spec.sessions.push(SessionSpec {
        actor: "watcher".into(),
        identity: Identity::from("user4"),
    });
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(result.passed, "unexpected failure: {:?}", result.failure);
    let converged = result
        .sessions
        .iter()
        .filter(|s| s.outcome.as_deref() == Some("converged"))
        .count();
    assert_eq!(converged, 3);
    assert_eq!(platform.opened_sessions(), 4);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_runs_author_distinct_records() {
    let (spec, settings) = assignment();
    let platform = SimulatedPlatform::new(settings);

    let first = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();
    let second = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(first.passed && second.passed);
    assert_ne!(first.title, second.title);
    assert_eq!(platform.records_titled(&first.title), 1);
    assert_eq!(platform.records_titled(&second.title), 1);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_latency_beyond_timeout_is_reported() {
    let (mut spec, settings) = assignment();
    spec.wait.timeout = Duration::from_secs(1);
    let platform = SimulatedPlatform::new(with_latency(settings, 5_000));

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(!result.passed);
    match result.failure {
        Some(Failure::ConvergenceTimeout {
            actor,
            title,
            waited_ms,
            attempts,
            ..
        }) => {
            assert_eq!(actor, "assignee");
            assert_eq!(title, result.title);
            assert!(waited_ms >= 1_000);
            assert!(waited_ms < 5_000);
            assert!(attempts > 1);
        }
        other => panic!("expected convergence timeout, got {:?}", other),
    }
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_longer_timeout_absorbs_the_same_latency() {
    let (mut spec, settings) = assignment();
    spec.wait.timeout = Duration::from_secs(8);
    let platform = SimulatedPlatform::new(with_latency(settings, 5_000));

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(result.passed, "unexpected failure: {:?}", result.failure);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_missing_default_milestone_is_a_mismatch() {
    let (spec, mut settings) = assignment();
    settings.default_milestone = None;
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(!result.passed);
    match result.failure {
        Some(Failure::Mismatch {
            field,
            authored,
            expected,
            observed,
            compared,
            ..
        }) => {
            assert_eq!(field, Field::Milestone);
            assert_eq!(authored, "No Milestone");
            assert_eq!(expected, "Milestone");
            assert_eq!(observed, "No Milestone");
            assert_eq!(compared.last(), Some(&Field::Estimation));
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_identity_rules_flag_estimation_unit() {
    let (mut spec, settings) = assignment();
    spec.rules = RuleSet::identity();
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(matches!(
        result.failure,
        Some(Failure::Mismatch { field: Field::Estimation, ref observed, .. }) if observed == "2h"
    ));
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_peer_fails_and_author_is_released() {
    let (spec, mut settings) = assignment();
    settings.authorized = vec![Identity::from("user1")];
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(!result.passed);
    match &result.failure {
        Some(Failure::Session { actor, code, .. }) => {
            assert_eq!(actor, "assignee");
            assert_eq!(code, "NAVIGATION");
        }
        other => panic!("expected session failure, got {:?}", other),
    }
    // Nothing was authored: the author was cancelled before creating
    assert_eq!(platform.opened_sessions(), 1);
    assert_eq!(platform.records_titled(&result.title), 0);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_workspace_releases_half_open_sessions() {
    let (mut spec, settings) = assignment();
    spec.workspace = "http://localhost:8083/workbench/other-ws/tracker/".into();
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(matches!(result.failure, Some(Failure::Session { .. })));
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_waiting_peers() {
    let (mut spec, settings) = assignment();
    spec.deadline = Duration::from_secs(2);
    spec.wait.timeout = Duration::from_secs(30);
    let platform = SimulatedPlatform::new(with_latency(settings, 20_000));

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(!result.passed);
    match &result.failure {
        Some(Failure::DeadlineExceeded {
            elapsed_ms,
            progress,
        }) => {
            assert!(*elapsed_ms >= 2_000);
            assert!(*elapsed_ms < 20_000);
            let author = &progress["author"];
            assert!(author
                .iter()
                .any(|s| matches!(s, Step::Created { .. })));
        }
        other => panic!("expected deadline failure, got {:?}", other),
    }
    let peer = result
        .sessions
        .iter()
        .find(|s| s.actor == "assignee")
        .unwrap();
    assert_eq!(peer.outcome.as_deref(), Some("cancelled"));
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_a_hanging_connect() {
    let (mut spec, settings) = assignment();
    spec.deadline = Duration::from_secs(2);
    let platform = SimulatedPlatform::new(settings);
    let backend = StuckConnect {
        platform: platform.clone(),
        stuck: Identity::from("user2"),
    };

    let result = tokio::time::timeout(
        Duration::from_secs(3600),
        scenario::run(Arc::new(backend), &spec),
    )
    .await
    .expect("run should return once the deadline passes")
    .unwrap();

    assert!(!result.passed);
    assert!(matches!(
        result.failure,
        Some(Failure::DeadlineExceeded { elapsed_ms, .. }) if (2_000..3_000).contains(&elapsed_ms)
    ));
    let assignee = result
        .sessions
        .iter()
        .find(|s| s.actor == "assignee")
        .unwrap();
    assert_eq!(assignee.outcome.as_deref(), Some("cancelled"));
    assert!(assignee.steps.is_empty());

    // The author was opened and must still be released
    assert_eq!(platform.opened_sessions(), 1);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_title_without_placeholder_is_still_unique_per_run() {
    let (mut spec, settings) = assignment();
    spec.record.title = "Collaborative test for issue".into();
    let platform = SimulatedPlatform::new(settings);

    let first = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();
    let second = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(first.passed, "unexpected failure: {:?}", first.failure);
    assert!(second.passed, "unexpected failure: {:?}", second.failure);
    assert_ne!(first.title, second.title);
    assert_eq!(
        first.title,
        format!("Collaborative test for issue-{}", first.run_id)
    );
    assert_eq!(platform.records_titled(&first.title), 1);
    assert_eq!(platform.records_titled(&second.title), 1);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_deadline_and_timeout_still_converge() {
    let (mut spec, settings) = assignment();
    spec.deadline = Duration::MAX;
    spec.wait.timeout = Duration::MAX;
    let platform = SimulatedPlatform::new(settings);

    let result = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap();

    assert!(result.passed, "unexpected failure: {:?}", result.failure);
    assert_clean_teardown(&platform);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_is_rejected() {
    let (mut spec, settings) = assignment();
    spec.wait.interval = Duration::ZERO;
    let platform = SimulatedPlatform::new(settings);

    let err = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(platform.opened_sessions(), 0);
}

#[tokio::test]
async fn test_single_session_scenario_is_rejected() {
    let (mut spec, settings) = assignment();
    spec.sessions.truncate(1);
    let platform = SimulatedPlatform::new(settings);

    let err = scenario::run(Arc::new(platform.clone()), &spec)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(platform.opened_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_loads_scenario_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    let yaml = FIXTURE.replace("preset: tracker-v1", "preset: identity");
    std::fs::write(&path, yaml).unwrap();

    let (spec, settings) = scenario::load_scenario(&path)
        .unwrap()
        .resolve(&Config::default())
        .unwrap();
    assert_eq!(spec.rules, RuleSet::identity());
    assert_eq!(spec.wait.interval, Duration::from_millis(200));

    let platform = SimulatedPlatform::new(settings);
    let result = scenario::run(Arc::new(platform), &spec).await.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["passed"], false);
    assert_eq!(json["failure"]["kind"], "mismatch");
    assert_eq!(json["failure"]["field"], "estimation");
}

#[test]
fn test_cli_validates_fixture() {
    let config_home = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_collab-harness"))
        .arg("validate")
        .arg(fixture_path())
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .output()
        .expect("failed to run collab-harness");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 sessions"));
    assert!(stdout.contains("tracker-v1@v1"));
}

#[test]
fn test_cli_rejects_invalid_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, FIXTURE.replace("author: author\n", "author: nobody\n")).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_collab-harness"))
        .arg("validate")
        .arg(&path)
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .output()
        .expect("failed to run collab-harness");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("nobody"));
}
