use std::fmt;

/// Phases of a reproduction run.
///
/// ```text
/// idle -> resetting -> starting -> awaiting_health(1) -> creating_workflow
///      -> observing_baseline -> inducing_failure -> outage -> restarting
///      -> awaiting_health(2) -> observing_recovery -> reporting -> done
///
/// any phase before reporting -> reporting   (unrecoverable failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Resetting,
    Starting,
    /// Health round 1 follows start, round 2 follows restart.
    AwaitingHealth(u8),
    CreatingWorkflow,
    ObservingBaseline,
    InducingFailure,
    Outage,
    Restarting,
    ObservingRecovery,
    Reporting,
    Done,
}

impl Phase {
    /// The next phase on the happy path, or `None` after `Done`.
    pub fn successor(self) -> Option<Self> {
        let next = match self {
            Self::Idle => Self::Resetting,
            Self::Resetting => Self::Starting,
            Self::Starting => Self::AwaitingHealth(1),
            Self::AwaitingHealth(1) => Self::CreatingWorkflow,
            Self::CreatingWorkflow => Self::ObservingBaseline,
            Self::ObservingBaseline => Self::InducingFailure,
            Self::InducingFailure => Self::Outage,
            Self::Outage => Self::Restarting,
            Self::Restarting => Self::AwaitingHealth(2),
            Self::AwaitingHealth(_) => Self::ObservingRecovery,
            Self::ObservingRecovery => Self::Reporting,
            Self::Reporting => Self::Done,
            Self::Done => return None,
        };
        Some(next)
    }

    /// Check whether `from -> to` is an edge of the phase graph.
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        if from.successor() == Some(to) {
            return true;
        }
        to == Self::Reporting && !matches!(from, Self::Reporting | Self::Done)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Resetting => f.write_str("resetting"),
            Self::Starting => f.write_str("starting"),
            Self::AwaitingHealth(round) => write!(f, "awaiting_health({round})"),
            Self::CreatingWorkflow => f.write_str("creating_workflow"),
            Self::ObservingBaseline => f.write_str("observing_baseline"),
            Self::InducingFailure => f.write_str("inducing_failure"),
            Self::Outage => f.write_str("outage"),
            Self::Restarting => f.write_str("restarting"),
            Self::ObservingRecovery => f.write_str("observing_recovery"),
            Self::Reporting => f.write_str("reporting"),
            Self::Done => f.write_str("done"),
        }
    }
}
