//! In-process result backend.
//!
//! [`InMemoryResultBackend`] records task state in a [`DashMap`]. It stands
//! in for a real distributed queue in tests and in deployments where a
//! host drives state transitions itself via [`start`], [`succeed`],
//! [`fail`], and [`revoke`].
//!
//! [`start`]: InMemoryResultBackend::start
//! [`succeed`]: InMemoryResultBackend::succeed
//! [`fail`]: InMemoryResultBackend::fail
//! [`revoke`]: InMemoryResultBackend::revoke

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::{BackendError, ResultBackend, TaskState, TaskSubmitter};

#[derive(Debug, Clone)]
struct Entry {
    state: TaskState,
    result: Option<String>,
}

/// Result backend and submitter kept entirely in memory.
///
/// # Examples
///
/// ```
/// use jobtrack::backend::memory::InMemoryResultBackend;
/// use jobtrack::backend::{ResultBackend, TaskState};
///
/// # tokio_test_block(async {
/// let backend = InMemoryResultBackend::new();
/// backend.fail("t1", "CUDA out of memory");
/// assert_eq!(backend.state("t1").await.unwrap(), TaskState::Failure);
/// assert_eq!(
///     backend.result("t1").await.unwrap().as_deref(),
///     Some("CUDA out of memory")
/// );
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryResultBackend {
    tasks: DashMap<String, Entry>,
    available: AtomicBool,
}

impl InMemoryResultBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggles simulated reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Sets the state of `task_id`, keeping any stored result.
    pub fn set_state(&self, task_id: &str, state: TaskState) {
        self.tasks
            .entry(task_id.to_string())
            .and_modify(|entry| entry.state = state)
            .or_insert(Entry {
                state,
                result: None,
            });
    }

    /// Marks `task_id` as started.
    pub fn start(&self, task_id: &str) {
        self.set_state(task_id, TaskState::Started);
    }

    /// Marks `task_id` as succeeded with an optional stringified result.
    pub fn succeed(&self, task_id: &str, result: Option<&str>) {
        self.tasks.insert(
            task_id.to_string(),
            Entry {
                state: TaskState::Success,
                result: result.map(str::to_string),
            },
        );
    }

    /// Marks `task_id` as failed with the given error text.
    pub fn fail(&self, task_id: &str, error: &str) {
        self.tasks.insert(
            task_id.to_string(),
            Entry {
                state: TaskState::Failure,
                result: Some(error.to_string()),
            },
        );
    }

    /// Marks `task_id` as revoked.
    pub fn revoke(&self, task_id: &str) {
        self.set_state(task_id, TaskState::Revoked);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(
                "in-memory backend marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryResultBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultBackend for InMemoryResultBackend {
    async fn state(&self, task_id: &str) -> Result<TaskState, BackendError> {
        self.check()?;
        Ok(self
            .tasks
            .get(task_id)
            .map_or(TaskState::Pending, |entry| entry.state))
    }

    async fn result(&self, task_id: &str) -> Result<Option<String>, BackendError> {
        self.check()?;
        Ok(self
            .tasks
            .get(task_id)
            .and_then(|entry| entry.result.clone()))
    }
}

#[async_trait]
impl TaskSubmitter for InMemoryResultBackend {
    async fn submit(&self, task_name: &str, _args: Value) -> Result<String, BackendError> {
        self.check()?;
        let task_id = Uuid::new_v4().to_string();
        self.set_state(&task_id, TaskState::Pending);
        tracing::debug!(task_id = %task_id, task_name, "task submitted to in-memory backend");
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tasks_are_pending() {
        let backend = InMemoryResultBackend::new();
        assert_eq!(backend.state("nope").await.unwrap(), TaskState::Pending);
        assert!(backend.result("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submit_registers_pending_task() {
        let backend = InMemoryResultBackend::new();
        let id = backend
            .submit("train", serde_json::json!({"epochs": 10}))
            .await
            .unwrap();
        assert_eq!(backend.state(&id).await.unwrap(), TaskState::Pending);
        backend.start(&id);
        assert_eq!(backend.state(&id).await.unwrap(), TaskState::Started);
    }

    #[tokio::test]
    async fn revoke_keeps_previous_result() {
        let backend = InMemoryResultBackend::new();
        backend.succeed("t", Some("done"));
        backend.revoke("t");
        assert_eq!(backend.state("t").await.unwrap(), TaskState::Revoked);
        assert_eq!(backend.result("t").await.unwrap().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn unavailable_backend_errors() {
        let backend = InMemoryResultBackend::new();
        backend.set_available(false);
        assert!(matches!(
            backend.state("t").await,
            Err(BackendError::Unavailable(_))
        ));
    }
}
