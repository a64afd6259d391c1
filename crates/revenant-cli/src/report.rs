//! End-of-run summary: verdict, evidence counts and the observation timeline.

use std::fmt::Write as _;

use chrono::Utc;

use revenant_core::ScenarioConfig;
use revenant_core::environment::TeardownAction;
use revenant_core::scenario::{Observation, ObservationKind, RunState};

/// Print the summary of a finished or interrupted run to stdout.
pub fn print_summary(state: &RunState, config: &ScenarioConfig, teardown: &TeardownAction) {
    print!("{}", render_summary(state, config, teardown));
}

pub fn render_summary(state: &RunState, config: &ScenarioConfig, teardown: &TeardownAction) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_summary(&mut out, state, config, teardown);
    out
}

fn write_summary(
    out: &mut String,
    state: &RunState,
    config: &ScenarioConfig,
    teardown: &TeardownAction,
) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "Workflow: {}", state.workflow_id())?;
    match state.verdict() {
        Some(verdict) => writeln!(out, "Verdict: {verdict}")?,
        None => writeln!(out, "Verdict: none (interrupted during {})", state.phase())?,
    }
    let secs = (Utc::now() - state.started_at()).num_seconds().max(0);
    writeln!(out, "Duration: {}m {}s", secs / 60, secs % 60)?;
    if let Some(at) = state.outage_started_at() {
        writeln!(out, "Outage began: {} (AFTER counts start here)", at.format("%H:%M:%S%.3f"))?;
    }
    writeln!(out)?;

    let evidence = state.evidence();
    writeln!(out, "Evidence:")?;
    writeln!(out, "  {:<10} {:>8} {:>8}", "MARKER", "BEFORE", "AFTER")?;
    writeln!(
        out,
        "  {:<10} {:>8} {:>8}",
        "activity",
        count(evidence.activity_before),
        count(evidence.activity_after)
    )?;
    writeln!(
        out,
        "  {:<10} {:>8} {:>8}",
        "anomaly",
        count(evidence.anomalies_before),
        count(evidence.anomalies_after)
    )?;
    writeln!(out, "  activity: \"{}\"", config.evidence.activity_marker)?;
    writeln!(
        out,
        "  anomaly:  \"{}\"",
        config.anomaly_marker(state.workflow_id().as_str())
    )?;
    writeln!(out)?;

    writeln!(out, "Timeline:")?;
    if state.observations().is_empty() {
        writeln!(out, "  (no observations)")?;
    }
    for observation in state.observations() {
        writeln!(
            out,
            "  {} {:<20} {}",
            observation.at.format("%H:%M:%S"),
            observation.phase.to_string(),
            describe(observation)
        )?;
    }

    if let Some(snapshot) = state.last_status() {
        writeln!(out)?;
        writeln!(
            out,
            "Last status (HTTP {} at {}):",
            snapshot.http_status,
            snapshot.observed_at.format("%H:%M:%S")
        )?;
        for line in snapshot.pretty().lines() {
            writeln!(out, "  {line}")?;
        }
    }

    let gaps: Vec<_> = state.gaps().collect();
    if !gaps.is_empty() {
        writeln!(out)?;
        writeln!(out, "Observation gaps: {}", gaps.len())?;
        for gap in gaps {
            writeln!(out, "  - {}: {}", gap.operation, gap.reason)?;
        }
    }

    writeln!(out)?;
    match teardown {
        TeardownAction::TornDown => writeln!(out, "Environment: torn down")?,
        TeardownAction::LeftRunning => {
            writeln!(out, "Environment: left running for inspection")?;
            let service = config
                .environment
                .log_services
                .first()
                .map(String::as_str)
                .unwrap_or("app");
            writeln!(out, "  follow logs: {} logs -f {service}", compose_prefix(config))?;
            writeln!(
                out,
                "  clean up:    {} down --volumes --remove-orphans",
                compose_prefix(config)
            )?;
        }
        TeardownAction::TeardownFailed(reason) => {
            writeln!(out, "Environment: teardown failed ({reason})")?;
            writeln!(
                out,
                "  clean up manually: {} down --volumes --remove-orphans",
                compose_prefix(config)
            )?;
        }
    }
    Ok(())
}

fn count(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn describe(observation: &Observation) -> String {
    match &observation.kind {
        ObservationKind::Status(snapshot) => format!(
            "status HTTP {}: {}",
            snapshot.http_status,
            snapshot.runtime_status().unwrap_or("unknown")
        ),
        ObservationKind::LogEvidence {
            service,
            marker,
            count,
        } => format!("logs {service}: {count} line(s) matching \"{marker}\""),
        ObservationKind::Environment { action, detail } => format!("{action}: {detail}"),
        ObservationKind::Gap(gap) => format!("gap in {}: {}", gap.operation, gap.reason),
    }
}

/// `docker compose` with the project flags the run used.
fn compose_prefix(config: &ScenarioConfig) -> String {
    let mut prefix = "docker compose".to_string();
    if let Some(ref file) = config.environment.compose_file {
        prefix.push_str(&format!(" -f {}", file.display()));
    }
    if let Some(ref project) = config.environment.project_name {
        prefix.push_str(&format!(" -p {project}"));
    }
    prefix
}
