//! In-process task execution.
//!
//! [`LocalWorkQueue`] runs tasks one at a time in enqueue order on a single
//! worker loop; [`MetadataStore`] tracks each task through
//! `pending -> running -> finished | failed` and serves consistent
//! snapshots for monitoring.

pub mod metadata;
pub mod queue;
pub mod task;

pub use metadata::{LocalCounts, LocalSnapshot, MetadataStore};
pub use queue::{LocalWorkQueue, WorkQueue, WorkerHandle};
pub use task::{LocalStatus, Task, TaskBody};
