//! Task-result backend: the authoritative source of distributed job state.
//!
//! Jobs that run on a separate distributed task queue report their state
//! to a durable result backend. This module defines the two seams the
//! tracking layer consumes:
//!
//! - [`ResultBackend`] -- `state(id)` and `result(id)` lookups.
//! - [`TaskSubmitter`] -- `submit(name, args) -> id`.
//!
//! # Backends
//!
//! - [`InMemoryResultBackend`](memory::InMemoryResultBackend) -- implements
//!   both traits; used in-process and in tests.
//! - [`RedisResultBackend`](redis::RedisResultBackend) -- reads Celery's
//!   `celery-task-meta-<id>` records. Available behind the `redis` feature.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// State of a task as reported by the result backend.
///
/// ```text
/// PENDING -> RECEIVED -> STARTED -> SUCCESS | FAILURE | REVOKED
///                          ^  |
///                          RETRY
/// ```
///
/// # Examples
///
/// ```
/// use jobtrack::backend::TaskState;
///
/// let state: TaskState = "STARTED".parse().unwrap();
/// assert_eq!(state, TaskState::Started);
/// assert!(!state.is_terminal());
/// assert!(TaskState::Revoked.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Unknown to the backend or waiting in the broker.
    Pending,
    /// Delivered to a worker but not started.
    Received,
    /// Running on a worker.
    Started,
    /// Scheduled for another attempt.
    Retry,
    /// Finished successfully (terminal).
    Success,
    /// Raised an error (terminal).
    Failure,
    /// Cancelled before or during execution (terminal).
    Revoked,
}

impl TaskState {
    /// Returns `true` for `SUCCESS`, `FAILURE`, and `REVOKED`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
        }
    }

    /// Parses a backend state string, treating unrecognised values as
    /// `PENDING` the way the Celery client does.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Pending)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RECEIVED" => Ok(Self::Received),
            "STARTED" => Ok(Self::Started),
            "RETRY" => Ok(Self::Retry),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "REVOKED" => Ok(Self::Revoked),
            other => Err(BackendError::Malformed {
                task_id: String::new(),
                message: format!("unknown task state {other:?}"),
            }),
        }
    }
}

/// Errors raised by a result backend or submitter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("result backend unavailable: {0}")]
    Unavailable(String),

    /// A stored result could not be decoded.
    #[error("malformed result for task {task_id}: {message}")]
    Malformed {
        /// The task whose record was malformed.
        task_id: String,
        /// What was wrong with it.
        message: String,
    },

    /// The backend does not offer the requested operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Read side of the task-result backend.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Current state of `task_id`. Unknown ids report [`TaskState::Pending`].
    async fn state(&self, task_id: &str) -> Result<TaskState, BackendError>;

    /// Stringified result or error of a task, if one has been stored.
    async fn result(&self, task_id: &str) -> Result<Option<String>, BackendError>;
}

/// Write side of the distributed task queue.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Enqueues `task_name` with `args` and returns the backend task id.
    async fn submit(&self, task_name: &str, args: Value) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Pending, false)]
    #[case(TaskState::Received, false)]
    #[case(TaskState::Started, false)]
    #[case(TaskState::Retry, false)]
    #[case(TaskState::Success, true)]
    #[case(TaskState::Failure, true)]
    #[case(TaskState::Revoked, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
        assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("success".parse::<TaskState>().unwrap(), TaskState::Success);
        assert_eq!(" Failure ".parse::<TaskState>().unwrap(), TaskState::Failure);
    }

    #[test]
    fn unknown_states_are_lenient_pending() {
        assert!("REJECTED".parse::<TaskState>().is_err());
        assert_eq!(TaskState::parse_lenient("REJECTED"), TaskState::Pending);
    }

    #[test]
    fn serde_uses_uppercase_names() {
        let json = serde_json::to_string(&TaskState::Started).unwrap();
        assert_eq!(json, "\"STARTED\"");
    }
}
