//! Shutdown signals that end a run early.
//!
//! Both Ctrl-C and, on Unix, SIGTERM cancel the scenario so the environment
//! guard still tears the stack down.

use std::fmt;

/// Which signal stopped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

impl Shutdown {
    /// Conventional exit status: 128 plus the signal number.
    pub fn exit_status(self) -> u8 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Listens for shutdown signals.
///
/// The SIGTERM handler is registered by [`ShutdownSignal::install`], so a
/// signal delivered before [`ShutdownSignal::recv`] is first polled is not
/// lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignal {
    /// Must be called from within a tokio runtime.
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let terminate = match signal(SignalKind::terminate()) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for SIGTERM");
                    None
                }
            };
            Self { terminate }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolves with the first shutdown signal received.
    pub async fn recv(&mut self) -> Shutdown {
        #[cfg(unix)]
        {
            let terminate = async {
                if let Some(stream) = self.terminate.as_mut() {
                    if stream.recv().await.is_some() {
                        return;
                    }
                }
                std::future::pending::<()>().await
            };
            tokio::select! {
                () = ctrl_c() => Shutdown::Interrupt,
                () = terminate => Shutdown::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c().await;
            Shutdown::Interrupt
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
