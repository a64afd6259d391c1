//! Shared test utilities for revenant integration tests.
//!
//! - [`MockService`]: an in-process stand-in for the service under test,
//!   served by axum on an ephemeral localhost port.
//! - [`ScriptedCompose`]: a `CommandRunner` that answers `docker compose`
//!   invocations from an in-memory model of the project instead of running
//!   containers.

mod compose;
mod service;

pub use compose::ScriptedCompose;
pub use service::{MockBehavior, MockService};

/// Base URL of a localhost port nobody is listening on.
pub async fn refused_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("no local addr");
    drop(listener);
    format!("http://{addr}")
}
