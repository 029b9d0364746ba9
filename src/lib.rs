//! Background job execution and multi-process job tracking.
//!
//! # Overview
//!
//! Two independent halves share one vocabulary of task ids and states:
//!
//! - **Local execution.** [`LocalWorkQueue`] runs closures one at a time in
//!   enqueue order on a single worker loop. [`local::MetadataStore`] tracks
//!   each task through `pending -> running -> finished | failed`, keeping a
//!   capped ring of completions for monitoring.
//! - **Distributed tracking.** Jobs handed to an external task-result
//!   backend are registered in a [`JobIndex`] over a shared key-value
//!   store, so every process can list, poll, and delete them.
//!   [`ProgressPoller`] derives progress from explicit meta fields or from
//!   `epoch=<n>` log lines; [`QueueSnapshot`] lists outstanding jobs oldest
//!   first. Both prune ids whose backend state is terminal.
//!
//! The distributed index is monitoring-only. Store failures surface as
//! `false`, empty rows, or an `UNKNOWN` status and never block execution.
//!
//! # Module Organization
//!
//! - [`local`] - in-process FIFO queue and task bookkeeping
//! - [`store`] - key-value store trait with in-memory and Redis backends
//! - [`backend`] - task-result backend traits and implementations
//! - [`index`] - the distributed job index
//! - [`poller`] / [`snapshot`] - read paths for monitoring
//! - [`reporter`] / [`submit`] - write paths for workers and submitters
//! - [`config`] - TOML and environment configuration
//! - [`error`] - error types

pub mod backend;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod index;
pub mod local;
#[cfg(feature = "logging")]
pub mod logging;
pub mod poller;
pub mod reporter;
pub mod snapshot;
pub mod store;
pub mod submit;

// Re-exports for ergonomic access
pub use backend::{BackendError, ResultBackend, TaskState, TaskSubmitter};
pub use config::{ConfigError, JobTrackConfig};
pub use domain::JobMeta;
pub use error::{JobError, Result};
pub use index::JobIndex;
pub use local::{LocalStatus, LocalWorkQueue, Task, WorkQueue, WorkerHandle};
pub use poller::{PollOutcome, ProgressPoller};
pub use reporter::JobReporter;
pub use snapshot::{QueueSnapshot, SnapshotRow, SnapshotSummary};
pub use store::{KvStore, StoreError};
pub use submit::JobSubmitter;
