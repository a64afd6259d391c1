//! Readiness polling.
//!
//! Connection refusals and request timeouts are the expected state while the
//! service boots, so polling never returns an error: the caller only learns
//! whether the service became healthy within the attempt budget.

use std::time::Duration;

use reqwest::Client;

/// Result of [`HealthWaiter::wait_until_healthy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// A check got a non-error response.
    Healthy {
        /// 1-based attempt that succeeded.
        attempt: u32,
        /// Whether the body carried the expected marker token.
        confirmed: bool,
    },
    /// Every attempt failed.
    TimedOut {
        attempts: u32,
        /// Verbose description of a final diagnostic check.
        diagnostic: String,
    },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

enum Check {
    Up { confirmed: bool },
    Down(String),
}

/// Polls a readiness endpoint with bounded per-request timeouts.
#[derive(Debug, Clone)]
pub struct HealthWaiter {
    http: Client,
    marker: String,
}

impl HealthWaiter {
    pub fn new(request_timeout: Duration, marker: impl Into<String>) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            marker: marker.into(),
        })
    }

    async fn check(&self, url: &str) -> Check {
        match self.http.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_client_error() || status.is_server_error() {
                    return Check::Down(format!("HTTP {status}"));
                }
                let body = resp.text().await.unwrap_or_default();
                Check::Up {
                    confirmed: body.contains(&self.marker),
                }
            }
            Err(e) => Check::Down(e.to_string()),
        }
    }

    /// Check `url` up to `max_attempts` times, sleeping `interval` after each
    /// failed attempt except the last.
    pub async fn wait_until_healthy(
        &self,
        url: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> HealthOutcome {
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.check(url).await {
                Check::Up { confirmed } => {
                    if confirmed {
                        tracing::info!(url, attempt, "service is healthy");
                    } else {
                        tracing::warn!(
                            url,
                            attempt,
                            marker = %self.marker,
                            "service responded but health marker is missing; treating as healthy (unconfirmed)"
                        );
                    }
                    return HealthOutcome::Healthy { attempt, confirmed };
                }
                Check::Down(reason) => {
                    tracing::debug!(url, attempt, reason = %reason, "health check failed");
                    if attempt < max_attempts {
                        tracing::info!(
                            "waiting for service ({attempt}/{max_attempts}), retrying in {}s",
                            interval.as_secs()
                        );
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        let diagnostic = self.diagnose(url).await;
        tracing::error!(
            url,
            attempts = max_attempts,
            diagnostic = %diagnostic,
            "service did not become healthy"
        );
        HealthOutcome::TimedOut {
            attempts: max_attempts,
            diagnostic,
        }
    }

    /// One verbose check for the failure report.
    async fn diagnose(&self, url: &str) -> String {
        match self.http.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.to_str().unwrap_or("<binary>")))
                    .collect::<Vec<_>>()
                    .join("; ");
                let body = resp.text().await.unwrap_or_default();
                format!("GET {url} -> HTTP {status}; headers: [{headers}]; body: {body}")
            }
            Err(e) => format!("GET {url} -> {e:?}"),
        }
    }
}
