//! Error taxonomy for a reproduction run.
//!
//! Only [`ScenarioError`] escalates to a failed run. Leaf errors raised while
//! the scenario is observing ([`EnvironmentError`] from a log fetch,
//! [`ClientError`] from a status check) are downgraded to
//! [`crate::scenario::ObservationGap`]s by the runner.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the container runtime.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The runtime binary could not be spawned at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within its time budget and was killed.
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// The command ran but exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Failure of a domain HTTP call against the service under test.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, timeout, or any other transport-level problem.
    #[error("transport error calling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered 404 for the instance.
    #[error("workflow instance {instance_id} not found")]
    NotFound { instance_id: String },

    /// Non-success status without an error marker in the body.
    #[error("request to {url} rejected with HTTP {status}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    /// The body reported an error, whatever the transport status said.
    #[error("service reported an error (HTTP {status}): {body}")]
    ErrorBody { status: u16, body: String },
}

/// Terminal failures that end a run with a failed verdict.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Tooling missing or the environment could not be brought up.
    #[error("environment setup failed: {0}")]
    Setup(#[from] EnvironmentError),

    /// The service never reported healthy within the polling bound.
    #[error("service not healthy after {attempts} attempts (health round {round})")]
    ReadinessTimeout { round: u8, attempts: u32 },

    /// The workflow instance could not be created.
    #[error("workflow creation failed: {0}")]
    Creation(#[source] ClientError),

    /// The runner attempted an edge outside the phase graph.
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Problems loading or validating a [`crate::config::ScenarioConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
