//! The reproduction scenario.
//!
//! [`ScenarioRunner`] walks the [`Phase`] graph strictly in order against a
//! [`ComposeEnvironment`], the service's health endpoint and its workflow
//! API. Setup, readiness and creation failures end the run with
//! [`Verdict::FailedToReproduce`]. Everything that goes wrong afterwards is
//! what the scenario is there to observe, so it is recorded in [`RunState`]
//! and the run carries on.

pub mod evidence;
pub mod phase;
pub mod state;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::client::WorkflowClient;
use crate::config::ScenarioConfig;
use crate::environment::{ComposeEnvironment, ResetOutcome};
use crate::error::ScenarioError;
use crate::health::{HealthOutcome, HealthWaiter};

pub use evidence::{EvidenceSummary, count_marker};
pub use phase::Phase;
pub use state::{Observation, ObservationGap, ObservationKind, RunState, Verdict};

/// Drives one run of the scenario.
pub struct ScenarioRunner<'a> {
    config: &'a ScenarioConfig,
    env: &'a ComposeEnvironment,
    health: HealthWaiter,
    client: WorkflowClient,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a ScenarioConfig, env: &'a ComposeEnvironment) -> reqwest::Result<Self> {
        let health = HealthWaiter::new(config.health_timeout(), config.health.marker.clone())?;
        let client = WorkflowClient::new(config, config.request_timeout())?;
        Ok(Self {
            config,
            env,
            health,
            client,
        })
    }

    /// Run the whole scenario and return its verdict.
    ///
    /// On return `state` is in [`Phase::Done`] and holds the verdict.
    pub async fn run(&self, state: &mut RunState) -> Verdict {
        let result = self.execute(state).await;
        let verdict = match result {
            Ok(()) => Verdict::from_evidence(state.evidence()),
            Err(e) => {
                tracing::error!(
                    workflow_id = %state.workflow_id(),
                    phase = %state.phase(),
                    error = %e,
                    "scenario aborted"
                );
                if state.phase() != Phase::Reporting {
                    if let Err(e) = state.advance(Phase::Reporting) {
                        tracing::warn!(error = %e, "could not enter reporting");
                    }
                }
                Verdict::FailedToReproduce {
                    reason: e.to_string(),
                }
            }
        };

        state.conclude(verdict.clone());
        if let Err(e) = state.advance(Phase::Done) {
            tracing::warn!(error = %e, "could not finish run");
        }
        tracing::info!(workflow_id = %state.workflow_id(), verdict = %verdict, "scenario finished");
        verdict
    }

    async fn execute(&self, state: &mut RunState) -> Result<(), ScenarioError> {
        let env_cfg = &self.config.environment;
        let timings = &self.config.timings;

        state.advance(Phase::Resetting)?;
        let detail = match self.env.reset().await {
            ResetOutcome::Removed(n) => format!("removed {n} leftover container(s)"),
            ResetOutcome::NothingToRemove => "no existing containers".to_string(),
        };
        state.record(ObservationKind::Environment {
            action: "reset".to_string(),
            detail,
        });

        state.advance(Phase::Starting)?;
        self.env.start().await?;
        state.record(ObservationKind::Environment {
            action: "start".to_string(),
            detail: format!("running: {}", self.env.running_services().join(", ")),
        });

        state.advance(Phase::AwaitingHealth(1))?;
        self.await_health(1).await?;

        state.advance(Phase::CreatingWorkflow)?;
        let handle = self
            .client
            .create_workflow(state.workflow_id())
            .await
            .map_err(ScenarioError::Creation)?;
        state.record(ObservationKind::Environment {
            action: "create workflow".to_string(),
            detail: format!(
                "{} accepted (HTTP {}, status {})",
                handle.instance_id,
                handle.http_status,
                handle.status.as_deref().unwrap_or("unknown")
            ),
        });

        state.advance(Phase::ObservingBaseline)?;
        self.dwell(timings.baseline_secs).await;
        self.observe_status(state).await;
        let activity_marker = &self.config.evidence.activity_marker;
        let activity_before = self.collect_evidence(state, activity_marker, None).await;
        let anomaly = self.config.anomaly_marker(state.workflow_id().as_str());
        let anomalies_before = self.collect_evidence(state, &anomaly, None).await;
        {
            let evidence = state.evidence_mut();
            evidence.activity_before = activity_before;
            evidence.anomalies_before = anomalies_before;
        }

        state.advance(Phase::InducingFailure)?;
        // Recovery evidence only counts lines logged from here on.
        let outage_start = Utc::now();
        state.mark_outage_start(outage_start);
        let killed = self.env.kill(&env_cfg.kill_services).await;
        if killed.is_empty() {
            tracing::warn!(
                services = ?env_cfg.kill_services,
                "no service was killed; the outage is not being exercised"
            );
        }
        state.record(ObservationKind::Environment {
            action: "kill".to_string(),
            detail: if killed.is_empty() {
                "nothing killed".to_string()
            } else {
                format!("killed: {}", killed.join(", "))
            },
        });

        state.advance(Phase::Outage)?;
        self.dwell(timings.outage_secs).await;
        self.observe_status(state).await;

        state.advance(Phase::Restarting)?;
        self.env.restart().await?;
        state.record(ObservationKind::Environment {
            action: "restart".to_string(),
            detail: format!("running: {}", self.env.running_services().join(", ")),
        });

        state.advance(Phase::AwaitingHealth(2))?;
        self.await_health(2).await?;

        state.advance(Phase::ObservingRecovery)?;
        self.dwell(timings.recovery_secs).await;
        self.observe_status(state).await;
        let since = Some(outage_start);
        let anomalies_after = self.collect_evidence(state, &anomaly, since).await;
        let activity_after = self.collect_evidence(state, activity_marker, since).await;
        {
            let evidence = state.evidence_mut();
            evidence.anomalies_after = anomalies_after;
            evidence.activity_after = activity_after;
        }

        state.advance(Phase::Reporting)?;
        Ok(())
    }

    async fn await_health(&self, round: u8) -> Result<(), ScenarioError> {
        let outcome = self
            .health
            .wait_until_healthy(
                &self.config.health_url(),
                self.config.health.max_attempts,
                self.config.health_interval(),
            )
            .await;
        match outcome {
            HealthOutcome::Healthy { .. } => Ok(()),
            HealthOutcome::TimedOut { attempts, .. } => {
                Err(ScenarioError::ReadinessTimeout { round, attempts })
            }
        }
    }

    /// Wait out an observation window, logging progress every tick.
    async fn dwell(&self, seconds: u64) {
        if seconds == 0 {
            return;
        }
        tracing::info!(seconds, "observing");

        let tick = self.config.timings.tick_secs;
        if tick == 0 || tick >= seconds {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            return;
        }

        let mut remaining = seconds;
        while remaining > 0 {
            let step = remaining.min(tick);
            tokio::time::sleep(Duration::from_secs(step)).await;
            remaining -= step;
            if remaining > 0 {
                tracing::info!(remaining_secs = remaining, "still observing");
            }
        }
    }

    async fn observe_status(&self, state: &mut RunState) {
        match self.client.get_status(state.workflow_id()).await {
            Ok(snapshot) => {
                tracing::info!(
                    workflow_id = %state.workflow_id(),
                    runtime_status = snapshot.runtime_status().unwrap_or("unknown"),
                    "workflow status:\n{}",
                    snapshot.pretty()
                );
                state.record(ObservationKind::Status(snapshot));
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id(),
                    error = %e,
                    "status check failed"
                );
                state.record(ObservationKind::Gap(ObservationGap {
                    operation: "status check".to_string(),
                    reason: e.to_string(),
                }));
            }
        }
    }

    /// Count `marker` across the configured log services, optionally only in
    /// lines logged since `since`.
    ///
    /// Returns `None` only when no service's logs could be fetched.
    async fn collect_evidence(
        &self,
        state: &mut RunState,
        marker: &str,
        since: Option<DateTime<Utc>>,
    ) -> Option<usize> {
        let env_cfg = &self.config.environment;
        let mut total = None;

        for service in &env_cfg.log_services {
            match self.env.logs(service, env_cfg.log_tail_lines, since).await {
                Ok(lines) => {
                    let count = count_marker(&lines, marker);
                    tracing::info!(service = %service, marker, count, "log evidence");
                    state.record(ObservationKind::LogEvidence {
                        service: service.clone(),
                        marker: marker.to_owned(),
                        count,
                    });
                    total = Some(total.unwrap_or(0) + count);
                }
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "log fetch failed");
                    state.record(ObservationKind::Gap(ObservationGap {
                        operation: format!("logs {service}"),
                        reason: e.to_string(),
                    }));
                }
            }
        }
        total
    }
}
