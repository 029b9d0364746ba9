//! Single-consumer FIFO work queue for in-process tasks.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::metadata::{LocalSnapshot, MetadataStore};
use super::task::{Task, TaskBody};
use crate::config::JobTrackConfig;
use crate::error::{JobError, Result};

struct Job {
    id: String,
    body: TaskBody,
}

type JobReceiver = mpsc::UnboundedReceiver<Job>;

/// Object-safe view of a local queue, for hosts that inject one.
pub trait WorkQueue: Send + Sync {
    /// Enqueues a boxed body and returns its task id.
    fn enqueue(&self, name: Option<&str>, body: TaskBody) -> Result<String>;

    /// Looks a task up in any bucket.
    fn task(&self, id: &str) -> Option<Task>;

    /// Point-in-time copy of the queue.
    fn snapshot(&self) -> LocalSnapshot;
}

/// In-process FIFO queue drained by exactly one worker loop.
///
/// Producers may enqueue from any task or thread. The worker runs one body
/// at a time on its own tokio task and awaits it before dequeuing the next,
/// so at most one task is in flight. A body that returns an error or panics
/// is recorded as `failed`; the loop keeps going.
///
/// # Examples
///
/// ```
/// use jobtrack::local::{LocalStatus, LocalWorkQueue};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let queue = LocalWorkQueue::new();
/// let worker = queue.start().unwrap();
///
/// let id = queue.enqueue_task(Some("merge"), || async { Ok(()) }).unwrap();
/// assert!(id.starts_with("task-"));
///
/// worker.shutdown().await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct LocalWorkQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: Arc<Mutex<Option<JobReceiver>>>,
    metadata: Arc<MetadataStore>,
    counter: Arc<AtomicU64>,
}

impl std::fmt::Debug for LocalWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorkQueue")
            .field("metadata", &self.metadata)
            .field("worker_attached", &self.rx.lock().is_none())
            .finish()
    }
}

impl Default for LocalWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalWorkQueue {
    /// Creates a stopped queue with default capacities.
    pub fn new() -> Self {
        Self::with_metadata(MetadataStore::default())
    }

    /// Creates a stopped queue sized from `config`.
    pub fn with_config(config: &JobTrackConfig) -> Self {
        Self::with_metadata(MetadataStore::new(
            config.finished_capacity,
            config.finished_recent,
        ))
    }

    fn with_metadata(metadata: MetadataStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            metadata: Arc::new(metadata),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the worker loop on the current tokio runtime.
    ///
    /// Tasks enqueued before `start` are kept and run in order.
    ///
    /// # Errors
    ///
    /// [`JobError::AlreadyStarted`] if a worker currently owns the queue.
    pub fn start(&self) -> Result<WorkerHandle> {
        let rx = self.rx.lock().take().ok_or(JobError::AlreadyStarted)?;
        let cancel = CancellationToken::new();
        let join = tokio::spawn(worker_loop(rx, Arc::clone(&self.metadata), cancel.clone()));
        tracing::debug!("local worker loop started");
        Ok(WorkerHandle {
            cancel,
            join,
            slot: Arc::clone(&self.rx),
        })
    }

    /// Enqueues an async body and returns its id.
    ///
    /// The task is visible as `pending` before this returns.
    ///
    /// # Errors
    ///
    /// [`JobError::QueueClosed`] when the receiving side was lost.
    pub fn enqueue_task<F, Fut>(&self, name: Option<&str>, work: F) -> Result<String>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.enqueue(name, Box::new(move || work().boxed()))
    }

    /// Enqueues a blocking body, run on tokio's blocking pool.
    pub fn enqueue_blocking<F>(&self, name: Option<&str>, work: F) -> Result<String>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.enqueue_task(name, move || async move {
            match tokio::task::spawn_blocking(work).await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow::anyhow!(join_error_message(e))),
            }
        })
    }

    /// Snapshot of counts, pending, running and recent completions.
    pub fn get_queue_snapshot(&self) -> LocalSnapshot {
        self.metadata.snapshot()
    }

    fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("task-{}-{seq}", chrono::Utc::now().timestamp_millis())
    }
}

impl WorkQueue for LocalWorkQueue {
    fn enqueue(&self, name: Option<&str>, body: TaskBody) -> Result<String> {
        let id = self.next_id();
        let task = Task::pending(id.clone(), name.map(str::to_string));
        let job = Job {
            id: id.clone(),
            body,
        };
        self.metadata.insert_pending_with(task, || {
            self.tx.send(job).map_err(|_| JobError::QueueClosed)
        })?;
        tracing::debug!(task_id = %id, name, "task enqueued");
        Ok(id)
    }

    fn task(&self, id: &str) -> Option<Task> {
        self.metadata.get(id)
    }

    fn snapshot(&self) -> LocalSnapshot {
        self.metadata.snapshot()
    }
}

/// Handle to a running worker loop.
///
/// Dropping the handle leaves the worker running detached.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<JobReceiver>,
    slot: Arc<Mutex<Option<JobReceiver>>>,
}

impl WorkerHandle {
    /// Returns `true` while the worker loop is alive.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stops the loop after the in-flight task, if any, completes.
    ///
    /// Queued tasks stay pending and run after the next
    /// [`start`](LocalWorkQueue::start).
    ///
    /// # Errors
    ///
    /// [`JobError::NotRunning`] if the loop died and its queue was lost.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        match self.join.await {
            Ok(rx) => {
                *self.slot.lock() = Some(rx);
                tracing::debug!("local worker loop stopped");
                Ok(())
            },
            Err(e) => {
                tracing::warn!(error = %e, "local worker loop ended abnormally");
                Err(JobError::NotRunning)
            },
        }
    }
}

async fn worker_loop(
    mut rx: JobReceiver,
    metadata: Arc<MetadataStore>,
    cancel: CancellationToken,
) -> JobReceiver {
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        run_job(job, &metadata).await;
    }
    rx
}

async fn run_job(job: Job, metadata: &MetadataStore) {
    let Job { id, body } = job;
    let task = metadata.mark_running(&id);
    tracing::info!(task_id = %id, name = task.label(), "starting task");

    // Call the body inside the spawned task: a panic while building the
    // future must surface as a JoinError, not unwind the worker loop.
    let outcome = match tokio::spawn(async move { body().await }).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(e) => Err(join_error_message(e)),
    };

    match &outcome {
        Ok(()) => tracing::info!(task_id = %id, "task completed"),
        Err(error) => tracing::warn!(task_id = %id, error = %error, "task failed"),
    }
    metadata.complete(&id, outcome);
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(&*err.into_panic())
    } else {
        "task was cancelled".to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("task panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("task panicked: {msg}")
    } else {
        "task panicked".to_string()
    }
}
