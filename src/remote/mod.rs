//! Remote generation backend.
//!
//! The backend has its own status vocabulary. [`RemoteTaskStatus`] maps it
//! onto three outcomes, and the backend's loosely-typed `output` field is
//! normalised into a single URL here so nothing downstream inspects it.

pub mod runway;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;
use crate::jobs::request::GenerationSpec;

pub use runway::RunwayClient;

/// Status of a task as reported by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTaskStatus {
    /// `SUCCEEDED`, with the normalised output location if one was given.
    Succeeded { output: Option<String> },
    /// `FAILED`, with the backend's reason if one was given.
    Failed { reason: Option<String> },
    /// Anything else (`PENDING`, `RUNNING`, `THROTTLED`, ...).
    InProgress { status: String },
}

impl RemoteTaskStatus {
    /// Map a raw status string and payload onto an outcome.
    pub fn from_parts(status: &str, output: Option<&Value>, reason: Option<String>) -> Self {
        match status {
            "SUCCEEDED" => Self::Succeeded {
                output: output.and_then(normalize_output),
            },
            "FAILED" => Self::Failed {
                reason: reason.filter(|r| !r.trim().is_empty()),
            },
            other => Self::InProgress {
                status: other.to_string(),
            },
        }
    }
}

/// Collapse the backend's `output` field into a single location.
///
/// Accepts a string, or the first element of an array; any other value is
/// stringified. `null` and empty arrays yield nothing.
pub fn normalize_output(output: &Value) -> Option<String> {
    match output {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(normalize_output),
        other => Some(other.to_string()),
    }
}

/// A remote video-generation backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Create one upstream task. Never retried.
    async fn submit(&self, spec: &GenerationSpec) -> Result<String, RemoteError>;

    /// Fetch the current status of an upstream task.
    async fn query(&self, remote_handle: &str) -> Result<RemoteTaskStatus, RemoteError>;
}
