//! Redis implementation of [`KvStore`].
//!
//! [`RedisStore`] maps each trait method onto exactly one Redis command
//! (`HSET`, `HSETNX`, `HGETALL`, `RPUSH`, `LRANGE`, `LTRIM`, `ZADD`,
//! `ZRANGE ... WITHSCORES`, ...). Multi-command consistency is left to the
//! caller: the job index is a monitoring view and tolerates interleavings.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jobtrack::index::JobIndex;
//! use jobtrack::store::redis::RedisStore;
//!
//! # async fn example() {
//! let store = RedisStore::new("redis://127.0.0.1:6379/2").await.unwrap();
//! let index = JobIndex::new(Arc::new(store));
//! # }
//! ```

use std::collections::HashMap;

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;

use crate::config::JobTrackConfig;
use crate::store::backend::{KvStore, StoreError};

/// Redis-backed key-value store.
///
/// Holds a [`MultiplexedConnection`]; clones share the underlying TCP
/// connection, so each command clones it rather than locking.
#[derive(Debug, Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    key_prefix: Option<String>,
}

impl RedisStore {
    /// Connects to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the client cannot be created
    /// or the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url).map_err(|e| StoreError::Unavailable {
            message: format!("failed to create Redis client: {e}"),
            source: Some(Box::new(e)),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("failed to connect to Redis: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self::with_connection(conn))
    }

    /// Connects using `redis_url` and `key_prefix` from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when no URL is configured or the
    /// connection fails.
    pub async fn from_config(config: &JobTrackConfig) -> Result<Self, StoreError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StoreError::unavailable("job index Redis URL is not set"))?;
        let store = Self::new(url).await?;
        Ok(match &config.key_prefix {
            Some(prefix) if !prefix.is_empty() => store.with_prefix(prefix.clone()),
            _ => store,
        })
    }

    /// Wraps an existing multiplexed connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: None,
        }
    }

    /// Namespaces every key as `{prefix}:{key}` (builder pattern).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_string(),
        }
    }
}

/// Maps a Redis error onto a [`StoreError`].
fn map_redis_error(err: ::redis::RedisError, key: &str) -> StoreError {
    if err.code() == Some("WRONGTYPE") {
        return StoreError::WrongType {
            key: key.to_string(),
        };
    }
    StoreError::Unavailable {
        message: format!("Redis error for key {key}: {err}"),
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &str)> = fields.iter().map(|(f, v)| (*f, v.as_str())).collect();
        self.conn
            .clone()
            .hset_multiple::<_, _, _, ()>(self.key(key), &items)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.conn
            .clone()
            .hset_nx(self.key(key), field, value)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .clone()
            .hget(self.key(key), field)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.conn
            .clone()
            .hgetall(self.key(key))
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.conn
            .clone()
            .rpush(self.key(key), value)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.conn
            .clone()
            .lpush(self.key(key), value)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.conn
            .clone()
            .lrange(self.key(key), start, stop)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.conn
            .clone()
            .ltrim::<_, ()>(self.key(key), start, stop)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn del(&self, keys: &[&str]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let full: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        self.conn
            .clone()
            .del(&full)
            .await
            .map_err(|e| map_redis_error(e, &keys.join(",")))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.conn
            .clone()
            .zadd::<_, _, _, ()>(self.key(key), member, score)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed: usize = self
            .conn
            .clone()
            .zrem(self.key(key), member)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(removed > 0)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.conn
            .clone()
            .zrange_withscores(self.key(key), start, stop)
            .await
            .map_err(|e| map_redis_error(e, key))
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        self.conn
            .clone()
            .zcard(self.key(key))
            .await
            .map_err(|e| map_redis_error(e, key))
    }
}

/// Contract tests against a live Redis instance.
///
/// Run with:
/// ```bash
/// REDIS_URL=redis://127.0.0.1:6379 cargo test --features redis-tests -- redis_ --test-threads=1
/// ```
///
/// Each test uses a unique key prefix, so no cleanup is needed.
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;

    async fn test_store() -> RedisStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisStore::new(&url)
            .await
            .expect("Redis connection failed -- is Redis running?")
            .with_prefix(format!("test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn redis_hset_nx_keeps_first_writer() {
        let store = test_store().await;
        assert!(store.hset_nx("job:a:meta", "enqueued_at", "100").await.unwrap());
        assert!(!store.hset_nx("job:a:meta", "enqueued_at", "999").await.unwrap());
        let meta = store.hgetall("job:a:meta").await.unwrap();
        assert_eq!(meta.get("enqueued_at").map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn redis_list_tail_and_trim() {
        let store = test_store().await;
        for i in 0..10 {
            store.rpush("job:a:log", &format!("line {i}")).await.unwrap();
        }
        store.ltrim("job:a:log", -3, -1).await.unwrap();
        let tail = store.lrange("job:a:log", -200, -1).await.unwrap();
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);
    }

    #[tokio::test]
    async fn redis_sorted_set_orders_by_score() {
        let store = test_store().await;
        store.zadd("jobs:active", "A", 5.0).await.unwrap();
        store.zadd("jobs:active", "B", 2.0).await.unwrap();
        store.zadd("jobs:active", "C", 8.0).await.unwrap();
        let ids: Vec<String> = store
            .zrange_withscores("jobs:active", 0, -1)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!(store.zrem("jobs:active", "A").await.unwrap());
        assert_eq!(store.zcard("jobs:active").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn redis_del_removes_all_key_types() {
        let store = test_store().await;
        store
            .hset("job:a:meta", &[("model_name", "m".to_string())])
            .await
            .unwrap();
        store.rpush("job:a:log", "x").await.unwrap();
        assert_eq!(store.del(&["job:a:meta", "job:a:log"]).await.unwrap(), 2);
        assert!(store.hgetall("job:a:meta").await.unwrap().is_empty());
    }
}
