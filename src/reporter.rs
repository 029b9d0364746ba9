//! Producer-side writer used by task bodies to publish logs and progress.
//!
//! A worker executing a distributed job reports through a [`JobReporter`]
//! bound to its task id; pollers on other processes read the same keys.

use crate::backend::TaskState;
use crate::constants::fields;
use crate::domain::meta::clamp_percent;
use crate::error::{JobError, Result};
use crate::index::JobIndex;

/// Publishes log lines and progress for one job.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use jobtrack::index::JobIndex;
/// use jobtrack::reporter::JobReporter;
/// use jobtrack::store::memory::InMemoryStore;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let index = JobIndex::new(Arc::new(InMemoryStore::new()));
/// let reporter = JobReporter::new(index.clone(), "t1").unwrap();
/// reporter.set_total_epoch(10).await.unwrap();
/// reporter.epoch(3, "loss=0.41").await.unwrap();
///
/// assert_eq!(index.log_tail("t1", 10).await.unwrap(), vec!["epoch=3 loss=0.41"]);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct JobReporter {
    index: JobIndex,
    task_id: String,
}

impl JobReporter {
    /// Binds a reporter to `task_id`.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidInput`] for an empty id.
    pub fn new(index: JobIndex, task_id: impl Into<String>) -> Result<Self> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(JobError::InvalidInput("task id is empty".to_string()));
        }
        Ok(Self { index, task_id })
    }

    /// The job this reporter writes to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Appends one line to the job log, keeping the newest `log_max_lines`.
    pub async fn log(&self, line: &str) -> Result<()> {
        self.index
            .append_log(&self.task_id, line)
            .await
            .inspect_err(|e| self.warn("log", e))
    }

    /// Logs an `epoch=<n>` line that pollers use to derive progress.
    pub async fn epoch(&self, epoch: u32, message: &str) -> Result<()> {
        let line = if message.is_empty() {
            format!("epoch={epoch}")
        } else {
            format!("epoch={epoch} {message}")
        };
        self.log(&line).await
    }

    /// Stores explicit progress, clamped to `[0, 100]`.
    pub async fn set_progress(&self, percent: i64) -> Result<()> {
        self.update(fields::PROGRESS, clamp_percent(percent).to_string())
            .await
    }

    /// Stores the number of epochs the job will run.
    pub async fn set_total_epoch(&self, total: u32) -> Result<()> {
        self.update(fields::TOTAL_EPOCH, total.to_string()).await
    }

    /// Mirrors a state into the meta hash. The result backend stays
    /// authoritative.
    pub async fn set_status(&self, state: TaskState) -> Result<()> {
        self.update(fields::STATUS, state.as_str().to_string()).await
    }

    async fn update(&self, field: &'static str, value: String) -> Result<()> {
        self.index
            .update_meta(&self.task_id, &[(field, value)])
            .await
            .inspect_err(|e| self.warn(field, e))
    }

    fn warn(&self, what: &str, error: &JobError) {
        tracing::warn!(task_id = %self.task_id, what, error = %error, "failed to publish job update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn reporter() -> (JobIndex, JobReporter) {
        let index = JobIndex::new(Arc::new(InMemoryStore::new()));
        let reporter = JobReporter::new(index.clone(), "t1").unwrap();
        (index, reporter)
    }

    #[test]
    fn empty_id_is_rejected() {
        let index = JobIndex::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            JobReporter::new(index, " "),
            Err(JobError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn progress_is_clamped_and_stored() {
        let (index, reporter) = reporter();
        reporter.set_progress(130).await.unwrap();
        reporter.set_total_epoch(12).await.unwrap();
        reporter.set_status(TaskState::Started).await.unwrap();

        let meta = index.meta("t1").await.unwrap();
        assert_eq!(meta.progress, 100);
        assert_eq!(meta.total_epoch, 12);
        assert_eq!(meta.status.as_deref(), Some("STARTED"));
    }

    #[tokio::test]
    async fn epoch_lines_are_formatted() {
        let (index, reporter) = reporter();
        reporter.epoch(1, "").await.unwrap();
        reporter.epoch(2, "loss=0.3").await.unwrap();
        assert_eq!(
            index.log_tail("t1", 5).await.unwrap(),
            vec!["epoch=1".to_string(), "epoch=2 loss=0.3".to_string()]
        );
    }

    #[tokio::test]
    async fn store_outage_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        let index = JobIndex::new(store.clone());
        let reporter = JobReporter::new(index, "t1").unwrap();
        store.set_available(false);
        let err = reporter.log("hello").await.unwrap_err();
        assert!(err.is_transient());
    }
}
