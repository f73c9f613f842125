//! Error types used throughout the client

use thiserror::Error;

use crate::types::Method;

/// Coarse classification of a [`PceError`], for callers that branch on the
/// failure taxonomy rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller cancelled (during admission, backoff, poll wait or in flight)
    Cancelled,
    /// Throttling persisted past the retry policy
    RetriesExhausted,
    /// Response shape violated the expected protocol
    Protocol,
    /// 4xx other than 429
    RemoteRejected,
    /// 5xx
    RemoteUnavailable,
    /// Job reached the `failed` state
    AsyncJobFailed,
    /// Job still pending after the configured number of polls
    PollLimitExceeded,
    /// Network-level failure before a status line was received
    Transport,
    /// Invalid client configuration
    Config,
}

/// Main error type for PolicyLink
#[derive(Error, Debug)]
pub enum PceError {
    #[error("request cancelled")]
    Cancelled,

    #[error("{method} {path}: still throttled after {attempts} attempts (last status: {status})")]
    RetriesExhausted { method: Method, path: String, attempts: u32, status: String },

    #[error("{method} {path}: protocol error: {message}")]
    Protocol { method: Method, path: String, message: String },

    #[error("{method} {path}: rejected with {status}: {body}")]
    RemoteRejected { method: Method, path: String, status: u16, body: String },

    #[error("{method} {path}: server unavailable ({status}): {body}")]
    RemoteUnavailable { method: Method, path: String, status: u16, body: String },

    #[error("async job at {status_url} failed")]
    AsyncJobFailed { status_url: String },

    #[error("async job at {status_url} still pending after {polls} polls")]
    PollLimitExceeded { status_url: String, polls: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("query branch [{branch}] failed: {source}")]
    Decomposition {
        branch: String,
        #[source]
        source: Box<PceError>,
    },
}

impl PceError {
    /// Build a protocol error for the given request.
    pub fn protocol(method: Method, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol { method, path: path.into(), message: message.into() }
    }

    /// Attach the decomposition branch that produced this error.
    ///
    /// Already-annotated errors keep their innermost branch so the report
    /// points at the sub-query that actually failed.
    pub fn in_branch(self, branch: impl Into<String>) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            already @ Self::Decomposition { .. } => already,
            other => Self::Decomposition { branch: branch.into(), source: Box::new(other) },
        }
    }

    /// Classification of this error. Decomposition errors report the kind of
    /// the underlying failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            Self::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            Self::AsyncJobFailed { .. } => ErrorKind::AsyncJobFailed,
            Self::PollLimitExceeded { .. } => ErrorKind::PollLimitExceeded,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Config(_) => ErrorKind::Config,
            Self::Decomposition { source, .. } => source.kind(),
        }
    }

    /// Whether a higher layer may reasonably retry the whole operation.
    ///
    /// The core itself never retries these; only 429 is absorbed locally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RemoteUnavailable | ErrorKind::Transport | ErrorKind::RetriesExhausted
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } | Self::RemoteUnavailable { status, .. } => {
                Some(*status)
            }
            Self::RetriesExhausted { .. } => Some(429),
            Self::Decomposition { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Result type alias for PolicyLink operations
pub type Result<T> = std::result::Result<T, PceError>;
