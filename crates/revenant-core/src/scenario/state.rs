use std::fmt;

use chrono::{DateTime, Utc};

use super::evidence::EvidenceSummary;
use super::phase::Phase;
use crate::client::StatusSnapshot;
use crate::error::ScenarioError;
use crate::workflow_id::WorkflowId;

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Anomaly lines for this run's instance appeared after recovery.
    Confirmed,
    /// The scenario completed but produced no anomaly evidence.
    Inconclusive,
    /// A terminal phase failed before evidence could be gathered.
    FailedToReproduce { reason: String },
}

impl Verdict {
    /// `Confirmed` iff at least one anomaly line was logged after the outage
    /// began.
    pub fn from_evidence(evidence: &EvidenceSummary) -> Self {
        match evidence.anomalies_after {
            Some(count) if count > 0 => Self::Confirmed,
            _ => Self::Inconclusive,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedToReproduce { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => f.write_str("confirmed"),
            Self::Inconclusive => f.write_str("inconclusive"),
            Self::FailedToReproduce { reason } => write!(f, "failed to reproduce: {reason}"),
        }
    }
}

/// A status check or log fetch that failed while the scenario was
/// observing. Kept as evidence, never escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationGap {
    /// What was attempted, e.g. `status check` or `logs app`.
    pub operation: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum ObservationKind {
    Status(StatusSnapshot),
    LogEvidence {
        service: String,
        marker: String,
        count: usize,
    },
    /// An environment action worth keeping in the timeline.
    Environment { action: String, detail: String },
    Gap(ObservationGap),
}

/// A timestamped entry in the run's timeline.
#[derive(Debug, Clone)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub phase: Phase,
    pub kind: ObservationKind,
}

/// Everything one run learns. Owned by the caller and threaded through the
/// runner by `&mut`.
#[derive(Debug)]
pub struct RunState {
    workflow_id: WorkflowId,
    phase: Phase,
    started_at: DateTime<Utc>,
    observations: Vec<Observation>,
    evidence: EvidenceSummary,
    /// When failure was induced. Recovery evidence is bounded by it.
    outage_started_at: Option<DateTime<Utc>>,
    verdict: Option<Verdict>,
}

impl RunState {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            phase: Phase::Idle,
            started_at: Utc::now(),
            observations: Vec::new(),
            evidence: EvidenceSummary::default(),
            outage_started_at: None,
            verdict: None,
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn evidence(&self) -> &EvidenceSummary {
        &self.evidence
    }

    pub fn outage_started_at(&self) -> Option<DateTime<Utc>> {
        self.outage_started_at
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    /// Move to `to`, rejecting edges outside the phase graph.
    pub fn advance(&mut self, to: Phase) -> Result<(), ScenarioError> {
        if !Phase::is_valid_transition(self.phase, to) {
            return Err(ScenarioError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        tracing::info!(workflow_id = %self.workflow_id, from = %self.phase, to = %to, "phase");
        self.phase = to;
        Ok(())
    }

    /// Append an observation stamped with the current phase.
    pub fn record(&mut self, kind: ObservationKind) {
        self.observations.push(Observation {
            at: Utc::now(),
            phase: self.phase,
            kind,
        });
    }

    pub(crate) fn evidence_mut(&mut self) -> &mut EvidenceSummary {
        &mut self.evidence
    }

    pub(crate) fn mark_outage_start(&mut self, at: DateTime<Utc>) {
        self.outage_started_at = Some(at);
    }

    pub(crate) fn conclude(&mut self, verdict: Verdict) {
        self.verdict = Some(verdict);
    }

    /// The most recent successful status snapshot.
    pub fn last_status(&self) -> Option<&StatusSnapshot> {
        self.observations.iter().rev().find_map(|o| match &o.kind {
            ObservationKind::Status(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    pub fn gaps(&self) -> impl Iterator<Item = &ObservationGap> {
        self.observations.iter().filter_map(|o| match &o.kind {
            ObservationKind::Gap(gap) => Some(gap),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new("wf-123".parse().unwrap())
    }

    #[test]
    fn new_state_is_idle_without_verdict() {
        let s = state();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.verdict().is_none());
        assert!(s.observations().is_empty());
        assert_eq!(s.workflow_id().as_str(), "wf-123");
    }

    #[test]
    fn advance_rejects_skips_and_keeps_phase() {
        let mut s = state();
        let err = s.advance(Phase::Starting).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidTransition { .. }));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn observations_are_stamped_with_current_phase() {
        let mut s = state();
        s.advance(Phase::Resetting).unwrap();
        s.record(ObservationKind::Environment {
            action: "reset".to_string(),
            detail: "no existing containers".to_string(),
        });
        s.advance(Phase::Starting).unwrap();
        s.record(ObservationKind::Gap(ObservationGap {
            operation: "status check".to_string(),
            reason: "connection refused".to_string(),
        }));

        let phases: Vec<Phase> = s.observations().iter().map(|o| o.phase).collect();
        assert_eq!(phases, vec![Phase::Resetting, Phase::Starting]);
        assert_eq!(s.gaps().count(), 1);
        assert!(s.observations()[0].at <= s.observations()[1].at);
    }

    #[test]
    fn verdict_from_evidence() {
        let mut evidence = EvidenceSummary::default();
        assert_eq!(Verdict::from_evidence(&evidence), Verdict::Inconclusive);

        evidence.anomalies_after = Some(0);
        assert_eq!(Verdict::from_evidence(&evidence), Verdict::Inconclusive);

        evidence.anomalies_after = Some(1);
        assert_eq!(Verdict::from_evidence(&evidence), Verdict::Confirmed);
    }

    #[test]
    fn anomalies_before_outage_do_not_confirm() {
        let evidence = EvidenceSummary {
            anomalies_before: Some(4),
            anomalies_after: Some(0),
            ..EvidenceSummary::default()
        };
        assert_eq!(Verdict::from_evidence(&evidence), Verdict::Inconclusive);
    }
}
