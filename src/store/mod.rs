//! Shared key-value store used by the distributed job index.
//!
//! # Backends
//!
//! - [`InMemoryStore`](memory::InMemoryStore) -- `DashMap`-backed store for
//!   single-process use and tests.
//! - [`RedisStore`](redis::RedisStore) -- Redis over a multiplexed async
//!   connection. Available behind the `redis` feature flag.
//!
//! # Key Schema
//!
//! | Key | Type | Purpose |
//! |-----|------|---------|
//! | `job:<id>:meta` | Hash | [`JobMeta`](crate::domain::JobMeta) fields |
//! | `job:<id>:log` | List | Append-only log lines, bounded |
//! | `jobs:active` | Sorted Set | Not-yet-terminal ids scored by enqueue time |
//! | `jobs:all` | List | Recently submitted ids, newest first |

pub mod backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use backend::{KvStore, StoreError};
