//! Distributed job index.
//!
//! [`JobIndex`] lets any process register, inspect, and delete jobs through
//! the shared [`KvStore`]. Per job it keeps a meta hash and a log list; a
//! global sorted set (`jobs:active`) orders not-yet-terminal ids by enqueue
//! time so monitoring never has to scan the key space.
//!
//! The index is a monitoring view. It is never consulted for execution
//! decisions, so individual commands are not combined into transactions and
//! cross-process interleavings are tolerated:
//!
//! - `enqueued_at` is written set-if-absent; the first registration wins and
//!   later registrations reuse it as the sorted-set score.
//! - `model_name` and `status` are last-writer-wins.
//! - Ids leave the active set only when a reader observes a terminal state
//!   (see [`ProgressPoller`](crate::poller::ProgressPoller) and
//!   [`QueueSnapshot`](crate::snapshot::QueueSnapshot)) or on delete.

use std::sync::Arc;

use crate::backend::TaskState;
use crate::config::JobTrackConfig;
use crate::constants::{fields, log_key, meta_key, ACTIVE_INDEX_KEY, RECENT_JOBS_KEY};
use crate::domain::JobMeta;
use crate::error::{JobError, Result};
use crate::store::KvStore;

/// Store-backed registry of distributed jobs.
///
/// Cheap to clone; clones share the store handle.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use jobtrack::index::JobIndex;
/// use jobtrack::store::memory::InMemoryStore;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let index = JobIndex::new(Arc::new(InMemoryStore::new()));
/// assert!(index.register_job("t1", "voice-a", Some(100)).await);
/// assert!(!index.register_job("", "voice-a", None).await);
///
/// let meta = index.meta("t1").await.unwrap();
/// assert_eq!(meta.enqueued_at, Some(100));
/// # });
/// ```
#[derive(Clone)]
pub struct JobIndex {
    store: Arc<dyn KvStore>,
    config: JobTrackConfig,
}

impl std::fmt::Debug for JobIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobIndex")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobIndex {
    /// Creates an index over `store` with default limits.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_config(store, JobTrackConfig::default())
    }

    /// Creates an index with explicit limits.
    pub fn with_config(store: Arc<dyn KvStore>, config: JobTrackConfig) -> Self {
        Self { store, config }
    }

    /// The limits this index was built with.
    pub fn config(&self) -> &JobTrackConfig {
        &self.config
    }

    /// Registers a job so it is visible before execution starts.
    ///
    /// Writes `enqueued_at` set-if-absent (defaulting to now), overwrites
    /// `model_name` and `status = PENDING`, then adds the id to the active
    /// set scored by the stored `enqueued_at`.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidInput`] for an empty id, [`JobError::Store`] when
    /// any command fails.
    pub async fn register(
        &self,
        task_id: &str,
        model_name: &str,
        enqueued_at: Option<i64>,
    ) -> Result<()> {
        ensure_id(task_id)?;
        let key = meta_key(task_id);
        let enqueued_at = enqueued_at.unwrap_or_else(|| chrono::Utc::now().timestamp());

        let first = self
            .store
            .hset_nx(&key, fields::ENQUEUED_AT, &enqueued_at.to_string())
            .await?;
        self.store
            .hset(
                &key,
                &[
                    (fields::TASK_ID, task_id.to_string()),
                    (fields::MODEL_NAME, model_name.to_string()),
                    (fields::STATUS, TaskState::Pending.as_str().to_string()),
                ],
            )
            .await?;

        let score = if first {
            enqueued_at
        } else {
            // Keep the ordering established by the first registration.
            self.store
                .hget(&key, fields::ENQUEUED_AT)
                .await?
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .unwrap_or(enqueued_at)
        };
        self.store
            .zadd(ACTIVE_INDEX_KEY, task_id, score as f64)
            .await?;

        tracing::debug!(task_id, model_name, enqueued_at = score, first, "job registered");
        Ok(())
    }

    /// UI-facing [`register`](Self::register): returns `false` instead of
    /// raising on an empty id or an unreachable store.
    pub async fn register_job(
        &self,
        task_id: &str,
        model_name: &str,
        enqueued_at: Option<i64>,
    ) -> bool {
        match self.register(task_id, model_name, enqueued_at).await {
            Ok(()) => true,
            Err(JobError::InvalidInput(_)) => false,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "job registration failed");
                false
            },
        }
    }

    /// Removes the meta hash, the log list, and the active-set entry.
    ///
    /// Returns `true` if any of them existed.
    pub async fn delete(&self, task_id: &str) -> Result<bool> {
        ensure_id(task_id)?;
        let meta = meta_key(task_id);
        let log = log_key(task_id);
        let removed_keys = self.store.del(&[meta.as_str(), log.as_str()]).await?;
        let was_active = self.store.zrem(ACTIVE_INDEX_KEY, task_id).await?;
        Ok(removed_keys > 0 || was_active)
    }

    /// UI-facing [`delete`](Self::delete): reports the outcome as
    /// `(ok, message)` and never raises.
    pub async fn delete_job(&self, task_id: &str) -> (bool, String) {
        match self.delete(task_id).await {
            Ok(true) => (true, format!("deleted job {task_id}")),
            Ok(false) => (true, format!("job {task_id} was not indexed")),
            Err(JobError::InvalidInput(_)) => (false, "no task id given".to_string()),
            Err(e) => {
                tracing::warn!(task_id, error = %e, "job delete failed");
                (false, format!("failed to delete job {task_id}: {e}"))
            },
        }
    }

    /// Reads and parses the meta hash. A missing hash yields defaults.
    pub async fn meta(&self, task_id: &str) -> Result<JobMeta> {
        ensure_id(task_id)?;
        let raw = self.store.hgetall(&meta_key(task_id)).await?;
        Ok(JobMeta::from_fields(task_id, &raw))
    }

    /// Returns the last `lines` log lines, oldest first.
    pub async fn log_tail(&self, task_id: &str, lines: usize) -> Result<Vec<String>> {
        ensure_id(task_id)?;
        if lines == 0 {
            return Ok(Vec::new());
        }
        let start = -isize::try_from(lines).unwrap_or(isize::MAX);
        Ok(self.store.lrange(&log_key(task_id), start, -1).await?)
    }

    /// Appends a log line and trims the list to the configured maximum.
    pub async fn append_log(&self, task_id: &str, line: &str) -> Result<()> {
        ensure_id(task_id)?;
        let key = log_key(task_id);
        let len = self.store.rpush(&key, line).await?;
        if len > self.config.log_max_lines {
            let keep = isize::try_from(self.config.log_max_lines).unwrap_or(isize::MAX);
            self.store.ltrim(&key, -keep, -1).await?;
        }
        Ok(())
    }

    /// Overwrites meta fields (last writer wins).
    pub async fn update_meta(&self, task_id: &str, updates: &[(&str, String)]) -> Result<()> {
        ensure_id(task_id)?;
        Ok(self.store.hset(&meta_key(task_id), updates).await?)
    }

    /// Drops `task_id` from the active set. Returns `true` if it was present.
    pub async fn prune(&self, task_id: &str) -> Result<bool> {
        ensure_id(task_id)?;
        let removed = self.store.zrem(ACTIVE_INDEX_KEY, task_id).await?;
        if removed {
            tracing::debug!(task_id, "pruned terminal job from active index");
        }
        Ok(removed)
    }

    /// Best-effort [`prune`](Self::prune) used by read paths.
    pub(crate) async fn prune_quietly(&self, task_id: &str) {
        if let Err(e) = self.prune(task_id).await {
            tracing::warn!(task_id, error = %e, "failed to prune job from active index");
        }
    }

    /// Oldest-first window of the active set as `(task_id, score)` pairs.
    pub async fn active(&self, limit: usize) -> Result<Vec<(String, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        Ok(self
            .store
            .zrange_withscores(ACTIVE_INDEX_KEY, 0, stop)
            .await?)
    }

    /// Number of ids in the active set.
    pub async fn active_count(&self) -> Result<usize> {
        Ok(self.store.zcard(ACTIVE_INDEX_KEY).await?)
    }

    /// Records `task_id` at the head of the recent-jobs list.
    pub async fn remember(&self, task_id: &str) -> Result<()> {
        ensure_id(task_id)?;
        self.store.lpush(RECENT_JOBS_KEY, task_id).await?;
        let stop = isize::try_from(self.config.recent_capacity)
            .unwrap_or(isize::MAX)
            .saturating_sub(1);
        self.store.ltrim(RECENT_JOBS_KEY, 0, stop).await?;
        Ok(())
    }

    /// Most recently remembered ids, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        Ok(self.store.lrange(RECENT_JOBS_KEY, 0, stop).await?)
    }
}

fn ensure_id(task_id: &str) -> Result<()> {
    if task_id.trim().is_empty() {
        Err(JobError::InvalidInput("task id is empty".to_string()))
    } else {
        Ok(())
    }
}
