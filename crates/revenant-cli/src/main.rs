mod config;
mod report;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use revenant_core::environment::{ComposeEnvironment, EnvironmentGuard, ProcessRunner, RunEnd};
use revenant_core::scenario::{RunState, ScenarioRunner, Verdict};
use revenant_core::{ScenarioError, WorkflowId};

use config::ResolvedConfig;
use signal::{Shutdown, ShutdownSignal};

/// How the scenario future ended.
#[derive(Debug)]
enum RunOutcome {
    Finished(Verdict),
    Stopped(Shutdown),
}

#[derive(Parser)]
#[command(
    name = "revenant",
    version,
    about = "Reproduce activities running without workflow state after a state-store outage"
)]
struct Cli {
    /// Scenario config file (overrides REVENANT_CONFIG and the default locations)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let ResolvedConfig { config, source } = ResolvedConfig::resolve(cli.config.as_deref())?;
    tracing::info!(source = %source, base_url = %config.service.base_url, "configuration loaded");

    let env = ComposeEnvironment::from_config(&config, Arc::new(ProcessRunner));
    env.preflight()
        .await
        .map_err(ScenarioError::Setup)
        .context("docker compose is required")?;

    let workflow_id = WorkflowId::generate(&config.workflow.id_prefix);
    tracing::info!(workflow_id = %workflow_id, "starting reproduction run");
    let mut state = RunState::new(workflow_id);

    let mut shutdown = ShutdownSignal::install();
    let guard = EnvironmentGuard::acquire(env, config.teardown.on_success);

    let outcome = match ScenarioRunner::new(&config, guard.environment()) {
        Ok(runner) => {
            tokio::select! {
                verdict = runner.run(&mut state) => RunOutcome::Finished(verdict),
                signal = shutdown.recv() => RunOutcome::Stopped(signal),
            }
        }
        Err(e) => {
            guard.release(RunEnd::Failed).await;
            return Err(e).context("failed to build HTTP client");
        }
    };

    let end = match &outcome {
        RunOutcome::Finished(verdict) => RunEnd::from_verdict(verdict),
        RunOutcome::Stopped(signal) => {
            tracing::warn!(signal = %signal, phase = %state.phase(), "run stopped, cleaning up");
            RunEnd::Interrupted
        }
    };
    let teardown = guard.release(end).await;

    report::print_summary(&state, &config, &teardown);

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Stopped(signal) => ExitCode::from(signal.exit_status()),
        RunOutcome::Finished(verdict) if verdict.is_failure() => ExitCode::FAILURE,
        RunOutcome::Finished(_) => ExitCode::SUCCESS,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_config_flag() {
        let cli = Cli::try_parse_from(["revenant", "--config", "repro.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("repro.toml")));
    }

    #[test]
    fn cli_runs_without_arguments() {
        let cli = Cli::try_parse_from(["revenant"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["revenant", "extra"]).is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(&RunOutcome::Finished(Verdict::Confirmed)), ExitCode::SUCCESS);
        assert_eq!(exit_code(&RunOutcome::Finished(Verdict::Inconclusive)), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&RunOutcome::Finished(Verdict::FailedToReproduce {
                reason: "never healthy".to_string()
            })),
            ExitCode::FAILURE
        );
        assert_eq!(exit_code(&RunOutcome::Stopped(Shutdown::Interrupt)), ExitCode::from(130));
        assert_eq!(exit_code(&RunOutcome::Stopped(Shutdown::Terminate)), ExitCode::from(143));
    }
}
