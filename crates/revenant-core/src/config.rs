//! Scenario configuration.
//!
//! Every section has defaults matching the reference environment (an `app`
//! service on port 8080 with `redis` and `dapr` as dependencies), so an
//! empty TOML document is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Placeholder substituted with the run's workflow instance id.
pub const INSTANCE_ID_PLACEHOLDER: &str = "{instance_id}";

/// Immutable configuration for one reproduction run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub service: ServiceSection,
    pub health: HealthSection,
    pub workflow: WorkflowSection,
    pub environment: EnvironmentSection,
    pub timings: TimingsSection,
    pub evidence: EvidenceSection,
    pub teardown: TeardownSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Base URL of the service under test, without a trailing slash.
    pub base_url: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthSection {
    pub path: String,
    /// Token expected in a healthy response body. Its absence only marks the
    /// check as unconfirmed.
    pub marker: String,
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            marker: "healthy".to_string(),
            max_attempts: 30,
            interval_secs: 2,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowSection {
    pub create_path: String,
    /// Status path; `{instance_id}` is substituted.
    pub status_path: String,
    /// JSON body for the creation request; `{instance_id}` is substituted.
    pub payload_template: String,
    /// Prefix of the generated instance id.
    pub id_prefix: String,
    pub request_timeout_secs: u64,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            create_path: "/workflow/hello".to_string(),
            status_path: "/workflow/{instance_id}".to_string(),
            payload_template: r#"{"instance_id": "{instance_id}"}"#.to_string(),
            id_prefix: "wf".to_string(),
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Compose file passed with `-f`; compose's own lookup applies when unset.
    pub compose_file: Option<PathBuf>,
    /// Compose project name passed with `-p`.
    pub project_name: Option<String>,
    /// Services killed to simulate the dependency outage.
    pub kill_services: Vec<String>,
    /// Services whose logs are searched for evidence.
    pub log_services: Vec<String>,
    pub log_tail_lines: usize,
    pub command_timeout_secs: u64,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            compose_file: None,
            project_name: None,
            kill_services: vec!["redis".to_string(), "dapr".to_string()],
            log_services: vec!["app".to_string()],
            log_tail_lines: 500,
            command_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingsSection {
    pub baseline_secs: u64,
    pub outage_secs: u64,
    pub recovery_secs: u64,
    /// Interval between progress ticks during a dwell. Zero disables ticks.
    pub tick_secs: u64,
}

impl Default for TimingsSection {
    fn default() -> Self {
        Self {
            baseline_secs: 45,
            outage_secs: 10,
            recovery_secs: 30,
            tick_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvidenceSection {
    /// Line printed by every normal activity execution.
    pub activity_marker: String,
    /// Line printed when an activity runs without workflow state;
    /// `{instance_id}` is substituted.
    pub anomaly_template: String,
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            activity_marker: "Hello world!".to_string(),
            anomaly_template:
                "No workflow state found for {instance_id} but activity is being executed anyways"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeardownSection {
    /// Tear the environment down after a completed run too. Failed and
    /// interrupted runs are always torn down.
    pub on_success: bool,
}

impl ScenarioConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "health.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.environment.log_services.is_empty() {
            return Err(ConfigError::Invalid(
                "environment.log_services must name at least one service".to_string(),
            ));
        }
        if !self.service.base_url.starts_with("http://")
            && !self.service.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "service.base_url must be an http(s) URL, got {:?}",
                self.service.base_url
            )));
        }
        let sample = self.creation_payload("wf-validate");
        serde_json::from_str::<serde_json::Value>(&sample).map_err(|e| {
            ConfigError::Invalid(format!(
                "workflow.payload_template does not render to JSON: {e}"
            ))
        })?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.service.base_url.trim_end_matches('/'), path)
    }

    pub fn health_url(&self) -> String {
        self.url(&self.health.path)
    }

    pub fn create_url(&self) -> String {
        self.url(&self.workflow.create_path)
    }

    pub fn status_url(&self, instance_id: &str) -> String {
        self.url(&render(&self.workflow.status_path, instance_id))
    }

    pub fn creation_payload(&self, instance_id: &str) -> String {
        render(&self.workflow.payload_template, instance_id)
    }

    pub fn anomaly_marker(&self, instance_id: &str) -> String {
        render(&self.evidence.anomaly_template, instance_id)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health.interval_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health.timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.request_timeout_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.environment.command_timeout_secs.max(1))
    }
}

fn render(template: &str, instance_id: &str) -> String {
    template.replace(INSTANCE_ID_PLACEHOLDER, instance_id)
}
