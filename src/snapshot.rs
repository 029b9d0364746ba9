//! Bounded monitoring view of outstanding distributed jobs.
//!
//! [`QueueSnapshot::get_queue_snapshot`] walks the active index oldest
//! first, asks the result backend for each id's state, and renders one row
//! per job that is still outstanding. Ids found in a terminal state are
//! pruned from the index and skipped, so every read also cleans up.
//!
//! Pruned ids are not back-filled: a snapshot may return fewer rows than
//! `limit` even when more active ids exist further down the index.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{ResultBackend, TaskState};
use crate::constants::UNKNOWN_STATUS;
use crate::domain::JobMeta;
use crate::index::JobIndex;
use crate::poller::observe_state;

/// One outstanding job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Backend task id.
    pub task_id: String,
    /// Backend state, or `UNKNOWN` when the backend could not be queried.
    pub state: String,
    /// Explicit progress from the meta hash.
    pub progress: u8,
    /// Expected epoch count, 0 when unknown.
    pub total_epoch: u32,
    /// Clipped to the configured character limit.
    pub model_name: String,
    /// Seconds since first registration.
    pub age_seconds: Option<i64>,
}

/// Counts over the rows of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Rows returned.
    pub total: usize,
    /// Rows in `PENDING`.
    pub pending: usize,
    /// Rows in `STARTED`.
    pub started: usize,
    /// Set when the snapshot could not be produced normally.
    pub note: Option<String>,
}

impl SnapshotSummary {
    fn from_rows(rows: &[SnapshotRow]) -> Self {
        let count = |state: TaskState| rows.iter().filter(|r| r.state == state.as_str()).count();
        Self {
            total: rows.len(),
            pending: count(TaskState::Pending),
            started: count(TaskState::Started),
            note: None,
        }
    }
}

impl fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "showing {} (PENDING={}, STARTED={})",
            self.total, self.pending, self.started
        )?;
        if let Some(note) = &self.note {
            write!(f, " - {note}")?;
        }
        Ok(())
    }
}

/// Produces snapshots of the distributed active index.
#[derive(Clone)]
pub struct QueueSnapshot {
    index: JobIndex,
    backend: Arc<dyn ResultBackend>,
}

impl fmt::Debug for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSnapshot")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl QueueSnapshot {
    /// Creates a snapshot reader over an index and a result backend.
    pub fn new(index: JobIndex, backend: Arc<dyn ResultBackend>) -> Self {
        Self { index, backend }
    }

    /// Snapshot of at most `limit` outstanding jobs, oldest first.
    ///
    /// `None` uses the configured default; any value is clamped to
    /// `1..=snapshot_max_limit`.
    pub async fn get_queue_snapshot(
        &self,
        limit: Option<usize>,
    ) -> (Vec<SnapshotRow>, SnapshotSummary) {
        self.snapshot_at(limit, chrono::Utc::now().timestamp()).await
    }

    /// [`get_queue_snapshot`](Self::get_queue_snapshot) with an explicit
    /// clock, in Unix seconds.
    pub async fn snapshot_at(
        &self,
        limit: Option<usize>,
        now: i64,
    ) -> (Vec<SnapshotRow>, SnapshotSummary) {
        let limit = self.effective_limit(limit);

        let active = match self.index.active(limit).await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read active job index");
                let summary = SnapshotSummary {
                    note: Some(format!("job index unavailable: {e}")),
                    ..SnapshotSummary::default()
                };
                return (Vec::new(), summary);
            },
        };

        let mut rows = Vec::with_capacity(active.len());
        for (task_id, score) in active {
            let state = observe_state(self.backend.as_ref(), &task_id).await;
            if state.is_some_and(|s| s.is_terminal()) {
                self.index.prune_quietly(&task_id).await;
                continue;
            }
            let meta = self.index.meta(&task_id).await.unwrap_or_else(|e| {
                tracing::warn!(task_id, error = %e, "failed to read job meta");
                JobMeta {
                    task_id: task_id.clone(),
                    ..JobMeta::default()
                }
            });
            rows.push(self.row(task_id, state, &meta, score, now));
        }

        let summary = SnapshotSummary::from_rows(&rows);
        tracing::debug!(rows = rows.len(), limit, "queue snapshot built");
        (rows, summary)
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        let config = self.index.config();
        let max = config.snapshot_max_limit.max(1);
        limit
            .unwrap_or(config.snapshot_default_limit)
            .clamp(1, max)
    }

    fn row(
        &self,
        task_id: String,
        state: Option<TaskState>,
        meta: &JobMeta,
        score: f64,
        now: i64,
    ) -> SnapshotRow {
        let enqueued_at = meta
            .enqueued_at
            .or_else(|| (score.is_finite() && score > 0.0).then(|| score as i64));
        SnapshotRow {
            task_id,
            state: state.map_or_else(|| UNKNOWN_STATUS.to_string(), |s| s.as_str().to_string()),
            progress: meta.progress,
            total_epoch: meta.total_epoch,
            model_name: clip_chars(&meta.model_name, self.index.config().model_name_max_chars),
            age_seconds: enqueued_at.map(|enq| (now - enq).max(0)),
        }
    }
}

/// Truncates to `max` characters without splitting a code point.
pub fn clip_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip_chars("abcdef", 3), "abc");
        assert_eq!(clip_chars("abc", 3), "abc");
        assert_eq!(clip_chars("음성모델", 2), "음성");
        assert_eq!(clip_chars("", 5), "");
    }

    #[test]
    fn summary_counts_pending_and_started() {
        let row = |state: &str| SnapshotRow {
            task_id: "t".to_string(),
            state: state.to_string(),
            progress: 0,
            total_epoch: 0,
            model_name: String::new(),
            age_seconds: None,
        };
        let summary =
            SnapshotSummary::from_rows(&[row("PENDING"), row("STARTED"), row("PENDING"), row("RETRY")]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.started, 1);
        assert_eq!(summary.to_string(), "showing 4 (PENDING=2, STARTED=1)");
    }

    #[test]
    fn summary_note_is_appended() {
        let summary = SnapshotSummary {
            note: Some("job index unavailable".to_string()),
            ..SnapshotSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "showing 0 (PENDING=0, STARTED=0) - job index unavailable"
        );
    }
}
