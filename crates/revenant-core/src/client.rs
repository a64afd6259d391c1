//! Domain HTTP calls against the service under test.
//!
//! The service reports some failures with a 2xx status, so creation is
//! judged by the response body first and the status code second.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ScenarioConfig;
use crate::error::ClientError;
use crate::workflow_id::WorkflowId;

/// A workflow instance the service accepted.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    pub instance_id: WorkflowId,
    pub http_status: u16,
    pub status: Option<String>,
    pub message: Option<String>,
}

/// Shape of the service's creation response. Every field is optional so an
/// unexpected but successful body still yields a handle.
#[derive(Debug, Default, Deserialize)]
struct CreationBody {
    status: Option<String>,
    message: Option<String>,
}

/// One status observation.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub instance_id: String,
    pub http_status: u16,
    /// Parsed JSON body, or the raw text as a JSON string.
    pub body: Value,
    pub observed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// The runtime status reported by the service, if the body has one.
    pub fn runtime_status(&self) -> Option<&str> {
        ["runtime_status", "runtimeStatus", "status"]
            .iter()
            .find_map(|key| self.body.get(*key).and_then(Value::as_str))
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.body.to_string())
    }
}

/// Classify a creation response.
///
/// An `error` marker anywhere in the body (ASCII case-insensitive) is a
/// failure even under a 2xx status.
pub fn classify_creation(url: &str, status: u16, body: &str) -> Result<(), ClientError> {
    if body.to_ascii_lowercase().contains("error") {
        return Err(ClientError::ErrorBody {
            status,
            body: body.to_owned(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(ClientError::Rejected {
            url: url.to_owned(),
            status,
            body: body.to_owned(),
        });
    }
    Ok(())
}

fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

/// Client for the workflow endpoints.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    http: Client,
    config: ScenarioConfig,
}

impl WorkflowClient {
    pub fn new(config: &ScenarioConfig, request_timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub async fn create_workflow(&self, instance_id: &WorkflowId) -> Result<WorkflowHandle, ClientError> {
        let url = self.config.create_url();
        let payload = self.config.creation_payload(instance_id.as_str());

        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;

        classify_creation(&url, status, &text)?;

        let body: CreationBody = serde_json::from_str(&text).unwrap_or_default();
        tracing::info!(
            workflow_id = %instance_id,
            http_status = status,
            body = %text.trim(),
            "workflow created"
        );

        Ok(WorkflowHandle {
            instance_id: instance_id.clone(),
            http_status: status,
            status: body.status,
            message: body.message,
        })
    }

    pub async fn get_status(&self, instance_id: &WorkflowId) -> Result<StatusSnapshot, ClientError> {
        let url = self.config.status_url(instance_id.as_str());

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                instance_id: instance_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::Rejected {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(StatusSnapshot {
            instance_id: instance_id.to_string(),
            http_status: status.as_u16(),
            body: parse_body(&text),
            observed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:8080/workflow/hello";

    #[test]
    fn error_body_under_200_is_failure() {
        let err = classify_creation(URL, 200, r#"{"status":"error","detail":"duplicate id"}"#)
            .unwrap_err();
        assert!(matches!(err, ClientError::ErrorBody { status: 200, .. }));
    }

    #[test]
    fn error_marker_is_case_insensitive() {
        let err = classify_creation(URL, 201, "Internal ERROR while scheduling").unwrap_err();
        assert!(matches!(err, ClientError::ErrorBody { .. }));
    }

    #[test]
    fn server_error_without_marker_is_rejected() {
        let err = classify_creation(URL, 503, "service unavailable").unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 503, .. }));
    }

    #[test]
    fn started_body_is_success() {
        classify_creation(
            URL,
            200,
            r#"{"instance_id":"wf-1","status":"started","message":"Hello World workflow started successfully"}"#,
        )
        .unwrap();
    }

    #[test]
    fn snapshot_runtime_status_prefers_runtime_field() {
        let snap = StatusSnapshot {
            instance_id: "wf-1".to_string(),
            http_status: 200,
            body: serde_json::json!({"status": "ok", "runtime_status": "RUNNING"}),
            observed_at: Utc::now(),
        };
        assert_eq!(snap.runtime_status(), Some("RUNNING"));
        assert!(snap.pretty().contains("\"runtime_status\": \"RUNNING\""));
    }

    #[test]
    fn non_json_body_is_kept_as_string() {
        assert_eq!(parse_body("plain text"), Value::String("plain text".to_string()));
        assert_eq!(parse_body(r#"{"a":1}"#), serde_json::json!({"a": 1}));
    }
}
