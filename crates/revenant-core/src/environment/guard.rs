//! Scoped ownership of the environment for the duration of a run.
//!
//! The guard is acquired before the scenario starts and must be released
//! exactly once with the way the run ended. Release applies the teardown
//! policy: a completed run leaves containers up for inspection unless
//! configured otherwise; a failed or interrupted run is always torn down.

use std::fmt;

use super::ComposeEnvironment;
use crate::scenario::Verdict;

/// How a run ended, as far as cleanup is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The scenario ran to its verdict (confirmed or inconclusive).
    Completed,
    /// A terminal phase failed.
    Failed,
    /// The operator interrupted the run.
    Interrupted,
}

impl RunEnd {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        if verdict.is_failure() {
            Self::Failed
        } else {
            Self::Completed
        }
    }
}

impl fmt::Display for RunEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// What release did with the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownAction {
    TornDown,
    LeftRunning,
    /// Teardown was attempted but the runtime reported an error.
    TeardownFailed(String),
}

/// Decide whether a run ending in `end` tears the environment down.
pub fn should_tear_down(end: RunEnd, on_success: bool) -> bool {
    match end {
        RunEnd::Completed => on_success,
        RunEnd::Failed | RunEnd::Interrupted => true,
    }
}

/// Owns the [`ComposeEnvironment`] for one run.
#[derive(Debug)]
pub struct EnvironmentGuard {
    env: ComposeEnvironment,
    teardown_on_success: bool,
    released: bool,
}

impl EnvironmentGuard {
    pub fn acquire(env: ComposeEnvironment, teardown_on_success: bool) -> Self {
        Self {
            env,
            teardown_on_success,
            released: false,
        }
    }

    pub fn environment(&self) -> &ComposeEnvironment {
        &self.env
    }

    /// Release the environment according to the teardown policy.
    pub async fn release(mut self, end: RunEnd) -> TeardownAction {
        self.released = true;

        if !should_tear_down(end, self.teardown_on_success) {
            tracing::info!(run = %end, "leaving containers running for inspection");
            return TeardownAction::LeftRunning;
        }

        tracing::info!(run = %end, "tearing down environment");
        match self.env.teardown().await {
            Ok(()) => TeardownAction::TornDown,
            Err(e) => {
                tracing::error!(error = %e, "teardown failed; containers may still be running");
                TeardownAction::TeardownFailed(e.to_string())
            }
        }
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!("environment guard dropped without release; containers may still be running");
        }
    }
}
