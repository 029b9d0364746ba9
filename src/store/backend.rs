//! Key-value store trait consumed by the distributed job index.
//!
//! [`KvStore`] exposes the handful of hash, list, and sorted-set commands the
//! index needs. Every method is a single command; implementations only have
//! to guarantee per-command atomicity. Nothing here knows about jobs, status
//! strings, or progress: that logic lives in [`JobIndex`](crate::index::JobIndex).
//!
//! # Index Semantics
//!
//! List and sorted-set ranges follow Redis conventions: `start` and `stop`
//! are inclusive and negative values count from the end (`-1` is the last
//! element). Sorted-set ranges are ordered by ascending score, ties broken
//! by member.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

/// Errors raised by a [`KvStore`] command.
///
/// # Examples
///
/// ```
/// use jobtrack::store::StoreError;
///
/// let err = StoreError::unavailable("connection refused");
/// assert!(err.is_unavailable());
/// assert_eq!(err.to_string(), "store unavailable: connection refused");
/// ```
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached or the command failed in transit.
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The key exists but holds a different kind of value.
    WrongType {
        /// The offending key.
        key: String,
    },
}

impl StoreError {
    /// Shorthand for an [`Unavailable`](Self::Unavailable) error without a source.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for transport-level failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message, .. } => write!(f, "store unavailable: {message}"),
            Self::WrongType { key } => {
                write!(f, "wrong value type at key {key}")
            },
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Hash, list, and sorted-set commands backing the job index.
///
/// Implementations must be `Send + Sync`; the index is shared by pollers
/// and producers through an `Arc<dyn KvStore>`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Sets the given hash fields, overwriting existing values.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;

    /// Sets a hash field only if it is absent. Returns `true` if it was written.
    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Reads one hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Reads every field of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Appends to the tail of a list, returning the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Prepends to the head of a list, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Returns the inclusive range `[start, stop]` of a list.
    async fn lrange(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;

    /// Keeps only the inclusive range `[start, stop]` of a list.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;

    /// Deletes keys of any type, returning how many existed.
    async fn del(&self, keys: &[&str]) -> Result<usize, StoreError>;

    /// Adds or re-scores a sorted-set member.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Removes a sorted-set member. Returns `true` if it was present.
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Returns members with scores in the inclusive rank range, lowest score first.
    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Number of members in a sorted set.
    async fn zcard(&self, key: &str) -> Result<usize, StoreError>;
}

/// Resolves a Redis-style inclusive range against a collection length.
///
/// Returns the half-open `start..end` slice bounds, or `None` when the range
/// selects nothing.
///
/// # Examples
///
/// ```
/// use jobtrack::store::backend::resolve_range;
///
/// assert_eq!(resolve_range(5, 0, -1), Some((0, 5)));
/// assert_eq!(resolve_range(5, -2, -1), Some((3, 5)));
/// assert_eq!(resolve_range(5, -200, -1), Some((0, 5)));
/// assert_eq!(resolve_range(5, 3, 1), None);
/// assert_eq!(resolve_range(0, 0, -1), None);
/// ```
pub fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}
