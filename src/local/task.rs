//! Local task records.

use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Boxed unit of work executed by the local worker loop.
pub type TaskBody = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + 'static>;

/// Lifecycle state of a local task.
///
/// ```text
/// pending --> running --+--> finished
///                       +--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalStatus {
    /// Queued, waiting for the worker.
    Pending,
    /// Being executed by the worker.
    Running,
    /// Body returned `Ok`.
    Finished,
    /// Body returned an error or panicked.
    Failed,
}

impl LocalStatus {
    /// Returns `true` for `finished` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Lowercase name used in snapshots and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one locally executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// `task-<unix_millis>-<counter>`.
    pub id: String,
    /// Display name given at enqueue time, if any.
    pub name: Option<String>,
    /// Current lifecycle state.
    pub status: LocalStatus,
    /// When the task was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When the worker picked the task up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the body returned or panicked.
    pub finished_at: Option<DateTime<Utc>>,
    /// Error text of a failed task.
    pub error: Option<String>,
}

impl Task {
    /// Creates a pending task stamped with the current time.
    pub fn pending(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            status: LocalStatus::Pending,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Display label: the name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Wall-clock run time, once both timestamps are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
