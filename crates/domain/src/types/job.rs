//! Async job handles and job documents

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::impl_wire_str_conversions;
use crate::macros::UnknownWireValue;

/// Server-side job state. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl_wire_str_conversions!(JobStatus {
    Pending => "pending",
    Done => "done",
    Failed => "failed",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Reference to another API object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

/// Body returned when polling a job's status location.
///
/// `status` stays a raw string so an unexpected value can be reported as a
/// protocol violation instead of a generic decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDocument {
    pub status: String,
    #[serde(default)]
    pub result: Option<Href>,
}

impl JobDocument {
    /// Parsed status.
    ///
    /// # Errors
    /// Returns [`UnknownWireValue`] when the server sent a status this client
    /// does not know.
    pub fn job_status(&self) -> Result<JobStatus, UnknownWireValue> {
        JobStatus::from_str(&self.status)
    }
}

/// Client-side view of one submitted job.
///
/// Created from the 202 response; `status_url` never changes, `result_url`
/// is filled in once a poll reports `done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub status_url: String,
    pub initial_retry_after: Option<Duration>,
    pub result_url: Option<String>,
}

impl JobHandle {
    pub fn new(status_url: impl Into<String>, initial_retry_after: Option<Duration>) -> Self {
        Self { status_url: status_url.into(), initial_retry_after, result_url: None }
    }
}
