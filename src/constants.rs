//! Key names, status strings, and default limits shared by the local queue
//! and the distributed job index.

/// Sorted set holding the ids of jobs not yet observed in a terminal state,
/// scored by enqueue time (unix seconds).
pub const ACTIVE_INDEX_KEY: &str = "jobs:active";

/// Newest-first list of recently submitted job ids.
pub const RECENT_JOBS_KEY: &str = "jobs:all";

/// Status rendered by the poller when it is called without a task id.
pub const NO_ID_STATUS: &str = "no id";

/// Status rendered when the task-result backend cannot be reached.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Number of finished local tasks kept before the oldest are dropped.
pub const DEFAULT_FINISHED_CAPACITY: usize = 200;

/// Number of finished local tasks reported by a queue snapshot.
pub const DEFAULT_FINISHED_RECENT: usize = 20;

/// Number of trailing log lines returned by a poll.
pub const DEFAULT_LOG_TAIL_LINES: usize = 200;

/// Upper bound on the length of a job's log list.
pub const DEFAULT_LOG_MAX_LINES: usize = 5_000;

/// Snapshot page size used when the caller does not pick one.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 30;

/// Hard cap on snapshot page size.
pub const MAX_SNAPSHOT_LIMIT: usize = 50;

/// Model names longer than this are clipped in snapshot rows.
pub const DEFAULT_MODEL_NAME_MAX_CHARS: usize = 80;

/// Length of the recent-jobs list.
pub const DEFAULT_RECENT_CAPACITY: usize = 500;

/// Hash fields of a job's meta record.
pub mod fields {
    /// Backend task id.
    pub const TASK_ID: &str = "task_id";
    /// Human-readable model or job name.
    pub const MODEL_NAME: &str = "model_name";
    /// Unix seconds of first registration; written set-if-absent.
    pub const ENQUEUED_AT: &str = "enqueued_at";
    /// Explicit progress percent reported by the task body.
    pub const PROGRESS: &str = "progress";
    /// Epoch count used for log-derived progress.
    pub const TOTAL_EPOCH: &str = "total_epoch";
    /// Last status mirrored by the producer or registration.
    pub const STATUS: &str = "status";
}

/// Builds the meta hash key for a job: `job:<id>:meta`.
///
/// # Examples
///
/// ```
/// use jobtrack::constants::meta_key;
///
/// assert_eq!(meta_key("abc"), "job:abc:meta");
/// ```
pub fn meta_key(task_id: &str) -> String {
    format!("job:{task_id}:meta")
}

/// Builds the log list key for a job: `job:<id>:log`.
///
/// # Examples
///
/// ```
/// use jobtrack::constants::log_key;
///
/// assert_eq!(log_key("abc"), "job:abc:log");
/// ```
pub fn log_key(task_id: &str) -> String {
    format!("job:{task_id}:log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_embed_task_id_verbatim() {
        assert_eq!(meta_key("t-1"), "job:t-1:meta");
        assert_eq!(log_key("t-1"), "job:t-1:log");
        assert_eq!(meta_key(""), "job::meta");
    }
}
