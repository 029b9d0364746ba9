//! Submission of distributed jobs.
//!
//! Submitting hands the task to the backend first, then registers it in the
//! job index so it shows up as `PENDING` before a worker picks it up.
//! Indexing is best-effort: a store outage never fails a submission.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::TaskSubmitter;
use crate::error::{JobError, Result};
use crate::index::JobIndex;

/// Submits tasks and records them in the job index.
#[derive(Clone)]
pub struct JobSubmitter {
    submitter: Arc<dyn TaskSubmitter>,
    index: Option<JobIndex>,
}

impl std::fmt::Debug for JobSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubmitter")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl JobSubmitter {
    /// Creates a submitter. Without an index, jobs are submitted but not
    /// tracked.
    pub fn new(submitter: Arc<dyn TaskSubmitter>, index: Option<JobIndex>) -> Self {
        Self { submitter, index }
    }

    /// Submits `task_name` with `args` and returns the backend task id.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidInput`] for an empty task name and
    /// [`JobError::Backend`] when the backend rejects the submission.
    pub async fn submit(&self, task_name: &str, args: Value, model_name: &str) -> Result<String> {
        if task_name.trim().is_empty() {
            return Err(JobError::InvalidInput("task name is empty".to_string()));
        }
        let task_id = self.submitter.submit(task_name, args).await?;
        tracing::info!(task_id = %task_id, task_name, model_name, "job submitted");

        if let Some(index) = &self.index {
            if index.register_job(&task_id, model_name, None).await {
                if let Err(e) = index.remember(&task_id).await {
                    tracing::warn!(task_id = %task_id, error = %e, "failed to record recent job");
                }
            }
        }
        Ok(task_id)
    }
}
