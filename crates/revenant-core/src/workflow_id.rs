use std::fmt;
use std::str::FromStr;

use chrono::Utc;

/// Identifier of the single workflow instance a run creates.
///
/// Generated ids are `<prefix>-<unix-seconds>-<pid>`: two runs started in
/// the same second by different processes differ in the pid component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Generate a fresh id from the current time and this process's id.
    pub fn generate(prefix: &str) -> Self {
        Self::from_parts(prefix, Utc::now().timestamp(), std::process::id())
    }

    pub fn from_parts(prefix: &str, unix_secs: i64, pid: u32) -> Self {
        Self(format!("{prefix}-{unix_secs}-{pid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = WorkflowIdParseError;

    /// Accept an explicit id. It ends up in a URL path segment and in log
    /// greps, so whitespace and `/` are refused.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(WorkflowIdParseError(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`WorkflowId`] string.
#[derive(Debug, Clone)]
pub struct WorkflowIdParseError(pub String);

impl fmt::Display for WorkflowIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workflow id: {:?}", self.0)
    }
}

impl std::error::Error for WorkflowIdParseError {}
