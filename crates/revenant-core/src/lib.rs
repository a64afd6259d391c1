//! Black-box reproduction harness for workflow activities that keep running
//! after their workflow's state has been lost.

pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod health;
pub mod scenario;
pub mod workflow_id;

pub use config::ScenarioConfig;
pub use error::{ClientError, ConfigError, EnvironmentError, ScenarioError};
pub use workflow_id::WorkflowId;
