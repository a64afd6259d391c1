//! `docker compose` backed environment controller.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{CommandOutput, CommandRunner, display_command};
use crate::config::ScenarioConfig;
use crate::error::EnvironmentError;

const DOCKER: &str = "docker";

/// What `reset()` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Leftover containers existed and `down` was issued for them.
    Removed(usize),
    /// Nothing from a previous run was found.
    NothingToRemove,
}

/// Runtime identity of a running service.
#[derive(Debug, Clone)]
struct ContainerHandle {
    container_id: String,
}

/// Controls the compose project the scenario runs against.
pub struct ComposeEnvironment {
    runner: Arc<dyn CommandRunner>,
    compose_file: Option<PathBuf>,
    project_name: Option<String>,
    timeout: Duration,
    handles: Mutex<BTreeMap<String, ContainerHandle>>,
    /// Set when the last refresh could not list services, so `handles` may
    /// be missing running containers.
    handles_stale: AtomicBool,
}

impl std::fmt::Debug for ComposeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeEnvironment")
            .field("compose_file", &self.compose_file)
            .field("project_name", &self.project_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ComposeEnvironment {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        compose_file: Option<PathBuf>,
        project_name: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            compose_file,
            project_name,
            timeout,
            handles: Mutex::new(BTreeMap::new()),
            handles_stale: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &ScenarioConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            runner,
            config.environment.compose_file.clone(),
            config.environment.project_name.clone(),
            config.command_timeout(),
        )
    }

    /// Full argument vector for `docker compose <subcommand…>`.
    fn compose_args(&self, subcommand: &[&str]) -> Vec<String> {
        let mut args = vec!["compose".to_string()];
        if let Some(ref file) = self.compose_file {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        if let Some(ref project) = self.project_name {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        args.extend(subcommand.iter().map(|s| (*s).to_string()));
        args
    }

    /// Run a compose subcommand, treating a non-zero exit as an error.
    async fn compose(&self, subcommand: &[&str]) -> Result<CommandOutput, EnvironmentError> {
        let args = self.compose_args(subcommand);
        let output = self.runner.run(DOCKER, &args, self.timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(EnvironmentError::Failed {
                command: display_command(DOCKER, &args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    fn handles(&self) -> MutexGuard<'_, BTreeMap<String, ContainerHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check that `docker compose` is installed and answers.
    pub async fn preflight(&self) -> Result<(), EnvironmentError> {
        let output = self.compose(&["version"]).await?;
        tracing::info!(version = %output.stdout.trim(), "container runtime available");
        Ok(())
    }

    /// Remove containers, networks and volumes left over from a prior run.
    ///
    /// Never fails: a missing project or a failing `down` is only logged.
    pub async fn reset(&self) -> ResetOutcome {
        let existing = match self.compose(&["ps", "-a", "-q"]).await {
            Ok(output) => non_empty_lines(&output.stdout).len(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list existing containers");
                0
            }
        };

        if existing == 0 {
            tracing::warn!("no existing containers to clean up");
            return ResetOutcome::NothingToRemove;
        }

        tracing::info!(containers = existing, "removing containers from a previous run");
        if let Err(e) = self.compose(&["down", "--volumes", "--remove-orphans"]).await {
            tracing::warn!(error = %e, "cleanup of previous run failed");
        }
        self.handles().clear();
        ResetOutcome::Removed(existing)
    }

    /// Bring every declared service up without waiting for readiness.
    ///
    /// `up -d` leaves already running services untouched, so this is safe to
    /// call on a running stack.
    pub async fn start(&self) -> Result<(), EnvironmentError> {
        self.compose(&["up", "-d"]).await?;
        tracing::info!("containers launched");
        self.refresh_handles().await;
        Ok(())
    }

    /// Bring back services stopped by [`Self::kill`].
    pub async fn restart(&self) -> Result<(), EnvironmentError> {
        tracing::info!("restarting stopped services");
        self.start().await
    }

    async fn refresh_handles(&self) {
        let services = match self.compose(&["ps", "--services"]).await {
            Ok(output) => non_empty_lines(&output.stdout),
            Err(e) => {
                tracing::warn!(error = %e, "could not list running services");
                self.handles_stale.store(true, Ordering::SeqCst);
                return;
            }
        };

        let mut fresh = BTreeMap::new();
        for service in services {
            match self.compose(&["ps", "-q", &service]).await {
                Ok(output) => {
                    if let Some(id) = non_empty_lines(&output.stdout).into_iter().next() {
                        fresh.insert(service, ContainerHandle { container_id: id });
                    }
                }
                Err(e) => tracing::warn!(service = %service, error = %e, "could not resolve container"),
            }
        }

        tracing::debug!(services = ?fresh.keys().collect::<Vec<_>>(), "container handles refreshed");
        *self.handles() = fresh;
        self.handles_stale.store(false, Ordering::SeqCst);
    }

    /// Whether `service` had a running container at the last refresh and has
    /// not been killed since.
    pub fn is_running(&self, service: &str) -> bool {
        self.handles().contains_key(service)
    }

    /// Names of the services currently believed to be running.
    pub fn running_services(&self) -> Vec<String> {
        self.handles().keys().cloned().collect()
    }

    /// Forcibly stop the named services, leaving every other service alone.
    ///
    /// Services that are not running are skipped with a warning. If the
    /// running set is unknown because the last refresh failed, every named
    /// service is targeted. Returns the services that were killed.
    pub async fn kill(&self, names: &[String]) -> Vec<String> {
        let mut targets = Vec::new();
        if self.handles_stale.load(Ordering::SeqCst) {
            tracing::warn!(
                services = ?names,
                "running services unknown, killing the named services directly"
            );
            targets.extend(names.iter().cloned());
        } else {
            for name in names {
                if self.is_running(name) {
                    targets.push(name.clone());
                } else {
                    tracing::warn!(service = %name, "service not running, nothing to kill");
                }
            }
        }
        if targets.is_empty() {
            return Vec::new();
        }

        let mut subcommand = vec!["kill"];
        subcommand.extend(targets.iter().map(String::as_str));

        let result = self.compose(&subcommand).await;
        match result {
            Ok(_) => {
                let mut handles = self.handles();
                for name in &targets {
                    if let Some(handle) = handles.remove(name) {
                        tracing::info!(service = %name, container_id = %handle.container_id, "killed");
                    }
                }
                targets
            }
            Err(e) => {
                tracing::warn!(error = %e, "kill failed");
                Vec::new()
            }
        }
    }

    /// The last `tail_lines` log lines of `service`, most recent last.
    ///
    /// With `since`, only lines the runtime stamped at or after that instant
    /// are returned.
    pub async fn logs(
        &self,
        service: &str,
        tail_lines: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, EnvironmentError> {
        let args = logs_args(service, tail_lines, since);
        let subcommand: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.compose(&subcommand).await?;

        let lines: Vec<String> = output.stdout.lines().map(str::to_owned).collect();
        if lines.iter().all(|l| l.trim().is_empty()) {
            tracing::warn!(service = %service, "no logs yet");
            return Ok(Vec::new());
        }
        Ok(lines)
    }

    /// Stop and remove everything the project created.
    pub async fn teardown(&self) -> Result<(), EnvironmentError> {
        self.compose(&["down", "--volumes", "--remove-orphans"]).await?;
        self.handles().clear();
        self.handles_stale.store(false, Ordering::SeqCst);
        tracing::info!("environment torn down");
        Ok(())
    }
}

/// Subcommand for `logs`. `since` is rendered with nanoseconds so lines from
/// earlier in the same second are excluded.
fn logs_args(service: &str, tail_lines: usize, since: Option<DateTime<Utc>>) -> Vec<String> {
    let mut args: Vec<String> = ["logs", "--no-color", "--no-log-prefix", "--tail"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    args.push(tail_lines.to_string());
    if let Some(since) = since {
        args.push("--since".to_owned());
        args.push(since.to_rfc3339_opts(SecondsFormat::Nanos, true));
    }
    args.push(service.to_owned());
    args
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}
