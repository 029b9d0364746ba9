//! Progress polling for a single distributed job.
//!
//! [`ProgressPoller::poll`] combines three sources into one view:
//!
//! 1. the tail of the job's log list,
//! 2. the meta hash (explicit progress, epoch count),
//! 3. the task-result backend (authoritative state).
//!
//! # Progress Resolution
//!
//! 1. Explicit `progress` from the meta hash when it is above zero.
//! 2. Otherwise, when `total_epoch > 0` and logs exist, the newest line
//!    containing `epoch=<n>` gives `round(100 * n / total_epoch)`, clamped
//!    to `[0, 100]`.
//! 3. Otherwise zero.
//!
//! Observing a terminal state prunes the id from the active index.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::{ResultBackend, TaskState};
use crate::constants::{NO_ID_STATUS, UNKNOWN_STATUS};
use crate::domain::meta::clamp_percent;
use crate::domain::JobMeta;
use crate::index::JobIndex;

static EPOCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\bepoch=(\d+)\b").expect("epoch pattern is valid")
});

/// Result of one poll, ready for a log view and a progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Trailing log lines joined with `\n`.
    pub log_text: String,
    /// Progress percent in `[0, 100]`.
    pub progress: u8,
    /// Backend state, decorated with the error text on failure.
    pub status: String,
}

impl PollOutcome {
    fn no_id() -> Self {
        Self {
            log_text: String::new(),
            progress: 0,
            status: NO_ID_STATUS.to_string(),
        }
    }

    /// Splits the outcome into `(log_text, progress, status)`.
    pub fn into_tuple(self) -> (String, u8, String) {
        (self.log_text, self.progress, self.status)
    }
}

/// Polls log tail, progress, and status of distributed jobs.
#[derive(Clone)]
pub struct ProgressPoller {
    index: JobIndex,
    backend: Arc<dyn ResultBackend>,
}

impl std::fmt::Debug for ProgressPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressPoller")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ProgressPoller {
    /// Creates a poller over an index and a result backend.
    pub fn new(index: JobIndex, backend: Arc<dyn ResultBackend>) -> Self {
        Self { index, backend }
    }

    /// Polls `task_id`.
    ///
    /// Never fails: an empty id yields `("", 0, "no id")` without touching
    /// the store, and store or backend failures degrade to empty logs, zero
    /// progress, or an `UNKNOWN` status.
    pub async fn poll(&self, task_id: &str) -> PollOutcome {
        if task_id.trim().is_empty() {
            return PollOutcome::no_id();
        }

        let logs = self
            .index
            .log_tail(task_id, self.index.config().log_tail_lines)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(task_id, error = %e, "failed to read job log");
                Vec::new()
            });
        let meta = self.index.meta(task_id).await.unwrap_or_else(|e| {
            tracing::warn!(task_id, error = %e, "failed to read job meta");
            JobMeta {
                task_id: task_id.to_string(),
                ..JobMeta::default()
            }
        });

        let progress = resolve_progress(&meta, &logs);
        let state = observe_state(self.backend.as_ref(), task_id).await;
        let status = match state {
            Some(TaskState::Failure) => self.failure_status(task_id).await,
            Some(state) => state.as_str().to_string(),
            None => UNKNOWN_STATUS.to_string(),
        };

        if state.is_some_and(|s| s.is_terminal()) {
            self.index.prune_quietly(task_id).await;
        }

        PollOutcome {
            log_text: logs.join("\n"),
            progress,
            status,
        }
    }

    async fn failure_status(&self, task_id: &str) -> String {
        let base = TaskState::Failure.as_str();
        match self.backend.result(task_id).await {
            Ok(Some(err)) if !err.trim().is_empty() => format!("{base}: {err}"),
            Ok(_) => base.to_string(),
            Err(e) => {
                tracing::debug!(task_id, error = %e, "failed to read failure detail");
                base.to_string()
            },
        }
    }
}

/// Queries the backend, logging and swallowing failures.
pub(crate) async fn observe_state(backend: &dyn ResultBackend, task_id: &str) -> Option<TaskState> {
    match backend.state(task_id).await {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(task_id, error = %e, "failed to query task state");
            None
        },
    }
}

/// Applies the progress resolution order to a meta record and log tail.
///
/// # Examples
///
/// ```
/// use jobtrack::domain::JobMeta;
/// use jobtrack::poller::resolve_progress;
///
/// let meta = JobMeta { total_epoch: 10, ..JobMeta::default() };
/// let logs = vec!["epoch=3 loss=0.9".to_string(), "epoch=7 loss=0.4".to_string()];
/// assert_eq!(resolve_progress(&meta, &logs), 70);
///
/// let explicit = JobMeta { progress: 15, ..meta };
/// assert_eq!(resolve_progress(&explicit, &logs), 15);
/// ```
pub fn resolve_progress(meta: &JobMeta, logs: &[String]) -> u8 {
    if meta.progress > 0 {
        return meta.progress;
    }
    if meta.total_epoch == 0 || logs.is_empty() {
        return 0;
    }
    last_epoch(logs).map_or(0, |epoch| epoch_progress(epoch, meta.total_epoch))
}

/// Finds the newest `epoch=<n>` marker, scanning lines newest to oldest.
pub fn last_epoch(logs: &[String]) -> Option<u64> {
    logs.iter().rev().find_map(|line| {
        EPOCH_RE
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
    })
}

/// `round(100 * epoch / total)`, clamped to `[0, 100]`.
pub fn epoch_progress(epoch: u64, total_epoch: u32) -> u8 {
    if total_epoch == 0 {
        return 0;
    }
    let pct = (100.0 * epoch as f64 / f64::from(total_epoch)).round();
    clamp_percent(pct.min(100.0) as i64)
}
