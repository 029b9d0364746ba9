//! Error types for job execution and tracking.
//!
//! Internal operations return [`JobError`]. The UI-facing methods
//! (`register_job`, `delete_job`, `poll`, `get_queue_snapshot`) convert it
//! into booleans, messages, or empty values and log the cause instead.

use thiserror::Error;

use crate::backend::BackendError;
use crate::store::StoreError;

/// Errors that can occur while queueing, registering, or polling jobs.
///
/// # Examples
///
/// ```
/// use jobtrack::JobError;
///
/// let err = JobError::InvalidInput("task id is empty".to_string());
/// assert_eq!(err.to_string(), "invalid input: task id is empty");
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, Error)]
pub enum JobError {
    /// A caller passed an unusable argument (e.g. an empty task id).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The shared key-value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task-result backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The local queue's receiving side is gone.
    #[error("local work queue is closed")]
    QueueClosed,

    /// `start` was called while a worker loop is already running.
    #[error("worker loop already started")]
    AlreadyStarted,

    /// The worker loop ended abnormally and its queue could not be recovered.
    #[error("worker loop is not running")]
    NotRunning,
}

impl JobError {
    /// Returns `true` if the failure came from an unreachable store or backend.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_unavailable(),
            Self::Backend(err) => matches!(err, BackendError::Unavailable(_)),
            _ => false,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JobError>;
