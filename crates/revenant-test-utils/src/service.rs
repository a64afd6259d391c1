use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::json;
use tokio::task::JoinHandle;

/// How the mock answers.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Health checks answered with 503 before the service turns healthy.
    pub unhealthy_checks: u32,
    /// Answer every health check with 503.
    pub never_healthy: bool,
    pub health_body: String,
    /// Fixed creation response; by default the service echoes a
    /// `started` body for the requested instance.
    pub create_response: Option<(u16, String)>,
    /// Fixed status response; by default created instances are `RUNNING`
    /// and unknown ones 404.
    pub status_response: Option<(u16, String)>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            unhealthy_checks: 0,
            never_healthy: false,
            health_body: json!({
                "status": "healthy",
                "message": "API and workflow runtime are running",
            })
            .to_string(),
            create_response: None,
            status_response: None,
        }
    }
}

impl MockBehavior {
    pub fn unhealthy_for(mut self, checks: u32) -> Self {
        self.unhealthy_checks = checks;
        self
    }

    pub fn never_healthy(mut self) -> Self {
        self.never_healthy = true;
        self
    }

    pub fn health_body(mut self, body: impl Into<String>) -> Self {
        self.health_body = body.into();
        self
    }

    pub fn create_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.create_response = Some((status, body.into()));
        self
    }

    pub fn status_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.status_response = Some((status, body.into()));
        self
    }
}

struct MockState {
    behavior: MockBehavior,
    health_hits: AtomicU32,
    status_hits: AtomicU32,
    created: Mutex<Vec<String>>,
}

type Reply = (StatusCode, String);

fn reply(status: u16, body: &str) -> Reply {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body.to_owned(),
    )
}

async fn health(State(state): State<Arc<MockState>>) -> Reply {
    let hit = state.health_hits.fetch_add(1, Ordering::SeqCst) + 1;
    if state.behavior.never_healthy || hit <= state.behavior.unhealthy_checks {
        return reply(503, r#"{"detail":"starting"}"#);
    }
    reply(200, &state.behavior.health_body)
}

async fn create(State(state): State<Arc<MockState>>, body: String) -> Reply {
    let instance_id = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("instance_id").and_then(|id| id.as_str()).map(str::to_owned))
        .unwrap_or_default();
    state.created.lock().unwrap().push(instance_id.clone());

    if let Some((status, ref body)) = state.behavior.create_response {
        return reply(status, body);
    }
    let body = json!({
        "instance_id": instance_id,
        "status": "started",
        "message": "Hello World workflow started successfully",
    });
    reply(200, &body.to_string())
}

async fn status(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Reply {
    state.status_hits.fetch_add(1, Ordering::SeqCst);

    if let Some((status, ref body)) = state.behavior.status_response {
        return reply(status, body);
    }
    if state.created.lock().unwrap().contains(&id) {
        let body = json!({ "instance_id": id, "runtime_status": "RUNNING" });
        return reply(200, &body.to_string());
    }
    reply(404, r#"{"detail":"Not Found"}"#)
}

/// The service under test, served in-process.
pub struct MockService {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockService {
    pub async fn start(behavior: MockBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            health_hits: AtomicU32::new(0),
            status_hits: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/workflow/hello", post(create))
            .route("/workflow/{id}", get(status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock service");
        let addr = listener.local_addr().expect("no local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn health_hits(&self) -> u32 {
        self.state.health_hits.load(Ordering::SeqCst)
    }

    pub fn status_hits(&self) -> u32 {
        self.state.status_hits.load(Ordering::SeqCst)
    }

    /// Instance ids received by the creation endpoint, in order.
    pub fn created_ids(&self) -> Vec<String> {
        self.state.created.lock().unwrap().clone()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.task.abort();
    }
}
