//! Bookkeeping for local tasks.
//!
//! All buckets live behind a single mutex so a snapshot is a consistent
//! point-in-time copy. The lock is never held across an `.await`.

use std::collections::VecDeque;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::task::{LocalStatus, Task};
use crate::constants::{DEFAULT_FINISHED_CAPACITY, DEFAULT_FINISHED_RECENT};

/// Per-bucket task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCounts {
    /// Tasks waiting for the worker.
    pub pending: usize,
    /// Tasks being executed (0 or 1).
    pub running: usize,
    /// Finished tasks still held in the ring.
    pub finished: usize,
    /// Failed tasks still held in the ring.
    pub failed: usize,
}

/// Point-in-time copy of the local queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    /// Bucket sizes at the time of the snapshot.
    pub counts: LocalCounts,
    /// Enqueue order.
    pub pending: Vec<Task>,
    /// At most one task.
    pub running: Vec<Task>,
    /// Most recent completions, in completion order (oldest first).
    pub finished_recent: Vec<Task>,
}

#[derive(Debug, Default)]
struct Buckets {
    pending: IndexMap<String, Task>,
    running: IndexMap<String, Task>,
    done: VecDeque<Task>,
}

/// Mutex-protected pending / running / done buckets.
#[derive(Debug)]
pub struct MetadataStore {
    inner: Mutex<Buckets>,
    finished_capacity: usize,
    finished_recent: usize,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new(DEFAULT_FINISHED_CAPACITY, DEFAULT_FINISHED_RECENT)
    }
}

impl MetadataStore {
    /// Creates a store keeping at most `finished_capacity` completed tasks
    /// and reporting `finished_recent` of them in snapshots.
    pub fn new(finished_capacity: usize, finished_recent: usize) -> Self {
        Self {
            inner: Mutex::new(Buckets::default()),
            finished_capacity: finished_capacity.max(1),
            finished_recent,
        }
    }

    /// Records a newly enqueued task.
    pub fn insert_pending(&self, task: Task) {
        self.inner.lock().pending.insert(task.id.clone(), task);
    }

    /// Records a pending task while `deliver` hands it to the worker.
    ///
    /// Both happen under the store lock, so the pending listing keeps the
    /// order in which tasks reach the worker. Nothing is recorded when
    /// `deliver` fails.
    pub fn insert_pending_with<E>(
        &self,
        task: Task,
        deliver: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut inner = self.inner.lock();
        deliver()?;
        inner.pending.insert(task.id.clone(), task);
        Ok(())
    }

    /// Removes a pending task, e.g. when its enqueue could not complete.
    pub fn remove_pending(&self, id: &str) -> Option<Task> {
        self.inner.lock().pending.shift_remove(id)
    }

    /// Moves `id` from pending to running.
    ///
    /// A missing pending entry is synthesized so running state is never lost.
    pub fn mark_running(&self, id: &str) -> Task {
        let mut inner = self.inner.lock();
        let mut task = inner.pending.shift_remove(id).unwrap_or_else(|| {
            tracing::debug!(task_id = id, "no pending entry, synthesizing running task");
            Task::pending(id, None)
        });
        task.status = LocalStatus::Running;
        task.started_at = Some(Utc::now());
        inner.running.insert(id.to_string(), task.clone());
        task
    }

    /// Moves `id` from running into the completed ring.
    ///
    /// `outcome` carries the error text of a failed task. The oldest
    /// completed entry is dropped once the ring is full.
    pub fn complete(&self, id: &str, outcome: Result<(), String>) -> Task {
        let mut inner = self.inner.lock();
        let mut task = inner
            .running
            .shift_remove(id)
            .or_else(|| inner.pending.shift_remove(id))
            .unwrap_or_else(|| Task::pending(id, None));
        task.finished_at = Some(Utc::now());
        match outcome {
            Ok(()) => task.status = LocalStatus::Finished,
            Err(error) => {
                task.status = LocalStatus::Failed;
                task.error = Some(error);
            },
        }
        inner.done.push_back(task.clone());
        while inner.done.len() > self.finished_capacity {
            inner.done.pop_front();
        }
        task
    }

    /// Looks `id` up across all buckets.
    pub fn get(&self, id: &str) -> Option<Task> {
        let inner = self.inner.lock();
        inner
            .pending
            .get(id)
            .or_else(|| inner.running.get(id))
            .or_else(|| inner.done.iter().rev().find(|t| t.id == id))
            .cloned()
    }

    /// Consistent copy of all buckets.
    pub fn snapshot(&self) -> LocalSnapshot {
        let inner = self.inner.lock();
        let failed = inner
            .done
            .iter()
            .filter(|t| t.status == LocalStatus::Failed)
            .count();
        let skip = inner.done.len().saturating_sub(self.finished_recent);
        LocalSnapshot {
            counts: LocalCounts {
                pending: inner.pending.len(),
                running: inner.running.len(),
                finished: inner.done.len() - failed,
                failed,
            },
            pending: inner.pending.values().cloned().collect(),
            running: inner.running.values().cloned().collect(),
            finished_recent: inner.done.iter().skip(skip).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn task_moves_through_buckets() {
        let store = MetadataStore::default();
        store.insert_pending(Task::pending("a", None));
        assert_eq!(store.snapshot().counts.pending, 1);

        let running = store.mark_running("a");
        assert_eq!(running.status, LocalStatus::Running);
        let snap = store.snapshot();
        assert_eq!(snap.counts.pending, 0);
        assert_eq!(snap.counts.running, 1);

        let done = store.complete("a", Ok(()));
        assert_eq!(done.status, LocalStatus::Finished);
        assert!(done.duration().is_some());
        let snap = store.snapshot();
        assert_eq!(snap.counts.running, 0);
        assert_eq!(snap.counts.finished, 1);
        assert_eq!(ids(&snap.finished_recent), vec!["a"]);
    }

    #[test]
    fn missing_pending_entry_is_synthesized() {
        let store = MetadataStore::default();
        let task = store.mark_running("ghost");
        assert_eq!(task.id, "ghost");
        assert_eq!(store.get("ghost").map(|t| t.status), Some(LocalStatus::Running));
    }

    #[test]
    fn failure_records_error() {
        let store = MetadataStore::default();
        store.insert_pending(Task::pending("a", None));
        store.mark_running("a");
        let task = store.complete("a", Err("boom".to_string()));
        assert_eq!(task.status, LocalStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert_eq!(store.snapshot().counts.failed, 1);
    }

    #[test]
    fn ring_drops_oldest_and_snapshot_shows_recent() {
        let store = MetadataStore::new(3, 2);
        for id in ["a", "b", "c", "d"] {
            store.mark_running(id);
            store.complete(id, Ok(()));
        }
        assert!(store.get("a").is_none());
        let snap = store.snapshot();
        assert_eq!(snap.counts.finished, 3);
        assert_eq!(ids(&snap.finished_recent), vec!["c", "d"]);
    }

    #[test]
    fn failed_delivery_records_nothing() {
        let store = MetadataStore::default();
        let outcome = store.insert_pending_with(Task::pending("a", None), || Err("closed"));
        assert_eq!(outcome, Err("closed"));
        assert!(store.get("a").is_none());

        store
            .insert_pending_with(Task::pending("b", None), || Ok::<(), &str>(()))
            .unwrap();
        assert_eq!(ids(&store.snapshot().pending), vec!["b"]);
    }

    #[test]
    fn pending_keeps_enqueue_order() {
        let store = MetadataStore::default();
        for id in ["x", "y", "z"] {
            store.insert_pending(Task::pending(id, None));
        }
        assert!(store.remove_pending("y").is_some());
        assert_eq!(ids(&store.snapshot().pending), vec!["x", "z"]);
    }
}
