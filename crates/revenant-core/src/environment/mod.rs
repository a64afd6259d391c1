//! Container environment control.
//!
//! [`ComposeEnvironment`] is the only part of the harness that talks to the
//! container runtime. It shells out through the [`CommandRunner`] seam so the
//! runtime can be replaced by a scripted fake in tests.

pub mod compose;
pub mod guard;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::EnvironmentError;

pub use compose::{ComposeEnvironment, ResetOutcome};
pub use guard::{EnvironmentGuard, RunEnd, TeardownAction};

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion.
///
/// A non-zero exit is not an error at this layer; callers decide what a
/// failing command means.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, EnvironmentError>;
}

/// [`CommandRunner`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, EnvironmentError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EnvironmentError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full buffer.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        let command = display_command(program, args);
        tracing::debug!(command = %command, "running");

        match tokio::time::timeout(timeout, async {
            tokio::join!(child.wait(), read_stdout, read_stderr)
        })
        .await
        {
            Ok((Ok(status), stdout, stderr)) => Ok(CommandOutput {
                code: status.code(),
                stdout,
                stderr,
            }),
            Ok((Err(source), _, _)) => Err(EnvironmentError::Spawn {
                program: program.to_owned(),
                source,
            }),
            Err(_) => {
                let _ = child.kill().await;
                Err(EnvironmentError::Timeout { command, timeout })
            }
        }
    }
}

/// Render a command line for logs and error messages.
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
