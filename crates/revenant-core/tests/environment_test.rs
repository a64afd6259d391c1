//! Integration tests for the compose environment controller and its guard,
//! driven through an in-memory compose project.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use revenant_core::EnvironmentError;
use revenant_core::environment::{
    ComposeEnvironment, EnvironmentGuard, ResetOutcome, RunEnd, TeardownAction,
};
use revenant_test_utils::ScriptedCompose;

const SERVICES: &[&str] = &["app", "dapr", "redis"];

fn env_over(compose: &Arc<ScriptedCompose>) -> ComposeEnvironment {
    ComposeEnvironment::new(
        compose.clone(),
        Some("docker-compose.yml".into()),
        Some("revenant-test".to_string()),
        Duration::from_secs(5),
    )
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

// ---------------------------------------------------------------------------
// preflight / reset / start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preflight_passes_project_flags() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);

    env.preflight().await.unwrap();

    assert_eq!(
        compose.invocations()[0],
        names(&[
            "compose",
            "-f",
            "docker-compose.yml",
            "-p",
            "revenant-test",
            "version"
        ])
    );
}

#[tokio::test]
async fn preflight_without_docker_is_spawn_error() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).without_docker());
    let env = env_over(&compose);

    let err = env.preflight().await.unwrap_err();

    match err {
        EnvironmentError::Spawn { program, source } => {
            assert_eq!(program, "docker");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected Spawn, got {other:?}"),
    }
}

#[tokio::test]
async fn reset_with_nothing_to_remove_issues_no_down() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);

    let outcome = env.reset().await;

    assert_eq!(outcome, ResetOutcome::NothingToRemove);
    assert!(!compose.subcommands().contains(&"down".to_string()));
}

#[tokio::test]
async fn reset_removes_leftovers() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).with_leftovers());
    let env = env_over(&compose);

    let outcome = env.reset().await;

    assert_eq!(outcome, ResetOutcome::Removed(3));
    assert_eq!(compose.subcommands(), names(&["ps", "down"]));
}

#[tokio::test]
async fn reset_tolerates_missing_runtime() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).without_docker());
    let env = env_over(&compose);

    assert_eq!(env.reset().await, ResetOutcome::NothingToRemove);
}

#[tokio::test]
async fn start_tracks_every_service() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);

    env.start().await.unwrap();

    assert_eq!(env.running_services(), names(&["app", "dapr", "redis"]));
    assert!(env.is_running("redis"));
}

#[tokio::test]
async fn failing_up_is_reported() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).failing_up());
    let env = env_over(&compose);

    let err = env.start().await.unwrap_err();

    match err {
        EnvironmentError::Failed {
            command,
            code,
            stderr,
        } => {
            assert!(command.ends_with("up -d"), "command: {command}");
            assert_eq!(code, Some(1));
            assert!(stderr.contains("failed to start"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(env.running_services().is_empty());
}

// ---------------------------------------------------------------------------
// kill / restart / logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kill_stops_only_the_named_services() {
    let compose = Arc::new(
        ScriptedCompose::new(SERVICES).with_logs("app", &["Hello world!", "Hello world!"]),
    );
    let env = env_over(&compose);
    env.start().await.unwrap();

    let killed = env.kill(&names(&["redis", "dapr"])).await;

    assert_eq!(killed, names(&["redis", "dapr"]));
    assert_eq!(compose.running(), names(&["app"]));
    assert!(env.is_running("app"));
    assert!(!env.is_running("redis"));
    assert!(!env.is_running("dapr"));

    let logs = env.logs("app", 100, None).await.unwrap();
    assert_eq!(logs, names(&["Hello world!", "Hello world!"]));
}

#[tokio::test]
async fn kill_skips_services_that_are_not_running() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);
    env.start().await.unwrap();
    env.kill(&names(&["redis"])).await;

    let killed = env.kill(&names(&["redis", "dapr"])).await;

    assert_eq!(killed, names(&["dapr"]));
    let last = compose.invocations().pop().unwrap();
    assert_eq!(last.last().map(String::as_str), Some("dapr"));
    assert!(!last.contains(&"redis".to_string()));
}

#[tokio::test]
async fn kill_targets_named_services_when_running_set_is_unknown() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).failing_service_listing());
    let env = env_over(&compose);
    env.start().await.unwrap();
    assert!(env.running_services().is_empty());

    let killed = env.kill(&names(&["redis", "dapr"])).await;

    assert_eq!(killed, names(&["redis", "dapr"]));
    assert_eq!(compose.running(), names(&["app"]));
}

#[tokio::test]
async fn restart_brings_killed_services_back() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);
    env.start().await.unwrap();
    env.kill(&names(&["redis", "dapr"])).await;

    env.restart().await.unwrap();

    assert_eq!(env.running_services(), names(&["app", "dapr", "redis"]));
}

#[tokio::test]
async fn logs_honor_tail() {
    let compose = Arc::new(
        ScriptedCompose::new(SERVICES).with_logs("app", &["one", "two", "three", "four"]),
    );
    let env = env_over(&compose);

    let logs = env.logs("app", 2, None).await.unwrap();

    assert_eq!(logs, names(&["three", "four"]));
}

#[tokio::test]
async fn logs_since_skip_lines_printed_before() {
    let compose = Arc::new(
        ScriptedCompose::new(SERVICES)
            .with_logs("app", &["Hello world!", "before the outage"])
            .with_restart_logs("app", &["after the restart"]),
    );
    let env = env_over(&compose);
    env.start().await.unwrap();

    let since = Utc::now();
    env.kill(&names(&["redis"])).await;
    env.restart().await.unwrap();

    let recent = env.logs("app", 100, Some(since)).await.unwrap();
    assert_eq!(recent, names(&["after the restart"]));

    let all = env.logs("app", 100, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let logs_call = compose
        .invocations()
        .into_iter()
        .rev()
        .find(|args| args.contains(&"logs".to_string()) && args.contains(&"--since".to_string()))
        .expect("logs --since issued");
    let value = &logs_call[logs_call.iter().position(|a| a == "--since").unwrap() + 1];
    assert_eq!(
        value,
        &since.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    );
}

#[tokio::test]
async fn logs_of_silent_service_are_empty() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);

    assert!(env.logs("redis", 50, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn logs_of_unknown_service_fail() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let env = env_over(&compose);

    let err = env.logs("worker", 50, None).await.unwrap_err();

    assert!(matches!(err, EnvironmentError::Failed { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// EnvironmentGuard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_run_leaves_containers_running() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let guard = EnvironmentGuard::acquire(env_over(&compose), false);
    guard.environment().start().await.unwrap();

    let action = guard.release(RunEnd::Completed).await;

    assert_eq!(action, TeardownAction::LeftRunning);
    assert_eq!(compose.running().len(), 3);
    assert!(!compose.subcommands().contains(&"down".to_string()));
}

#[tokio::test]
async fn completed_run_tears_down_when_configured() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES));
    let guard = EnvironmentGuard::acquire(env_over(&compose), true);
    guard.environment().start().await.unwrap();

    let action = guard.release(RunEnd::Completed).await;

    assert_eq!(action, TeardownAction::TornDown);
    assert!(compose.running().is_empty());
}

#[tokio::test]
async fn failed_and_interrupted_runs_tear_down() {
    for end in [RunEnd::Failed, RunEnd::Interrupted] {
        let compose = Arc::new(ScriptedCompose::new(SERVICES));
        let guard = EnvironmentGuard::acquire(env_over(&compose), false);
        guard.environment().start().await.unwrap();

        let action = guard.release(end).await;

        assert_eq!(action, TeardownAction::TornDown, "run end {end}");
        assert!(compose.running().is_empty(), "run end {end}");
        assert_eq!(compose.subcommands().last().map(String::as_str), Some("down"));
    }
}

#[tokio::test]
async fn teardown_failure_is_reported_not_raised() {
    let compose = Arc::new(ScriptedCompose::new(SERVICES).without_docker());
    let guard = EnvironmentGuard::acquire(env_over(&compose), false);

    let action = guard.release(RunEnd::Failed).await;

    assert!(matches!(action, TeardownAction::TeardownFailed(ref msg) if msg.contains("docker")));
}
