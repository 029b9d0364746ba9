//! Reader for Celery task results stored in Redis.
//!
//! Celery's Redis result backend writes one JSON string per task at
//! `celery-task-meta-<id>`:
//!
//! ```json
//! {"status": "FAILURE", "result": {"exc_type": "ValueError", "exc_message": ["boom"]},
//!  "traceback": "...", "task_id": "..."}
//! ```
//!
//! A missing key means the task is unknown or still queued and reads as
//! `PENDING`. Submission goes through the broker, not the result store, so
//! this backend implements [`ResultBackend`] only.

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{BackendError, ResultBackend, TaskState};
use crate::config::JobTrackConfig;

const CELERY_META_PREFIX: &str = "celery-task-meta-";

#[derive(Debug, Deserialize)]
struct CeleryMeta {
    status: String,
    #[serde(default)]
    result: Value,
}

/// Celery result reader over a multiplexed Redis connection.
#[derive(Debug, Clone)]
pub struct RedisResultBackend {
    conn: MultiplexedConnection,
}

impl RedisResultBackend {
    /// Connects to the Redis database Celery writes results into.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the connection fails.
    pub async fn new(url: &str) -> Result<Self, BackendError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| BackendError::Unavailable(format!("failed to create Redis client: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::Unavailable(format!("failed to connect to Redis: {e}")))?;
        Ok(Self { conn })
    }

    /// Connects to [`JobTrackConfig::result_backend_url`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] when no URL is configured or
    /// the connection fails.
    pub async fn from_config(config: &JobTrackConfig) -> Result<Self, BackendError> {
        let url = config
            .result_backend_url()
            .ok_or_else(|| BackendError::Unavailable("result backend URL is not set".to_string()))?;
        Self::new(url).await
    }

    /// Wraps an existing multiplexed connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    async fn load(&self, task_id: &str) -> Result<Option<CeleryMeta>, BackendError> {
        let raw: Option<String> = self
            .conn
            .clone()
            .get(format!("{CELERY_META_PREFIX}{task_id}"))
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| BackendError::Malformed {
                task_id: task_id.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
    }
}

/// Renders a Celery result value the way `str(result)` would.
///
/// Exceptions are serialised as `{"exc_type", "exc_message"}`; the message
/// list is joined, falling back to the exception type.
fn render_result(result: &Value) -> Option<String> {
    match result {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) if map.contains_key("exc_type") => {
            let message = match map.get("exc_message") {
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|p| match p {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            if message.is_empty() {
                map.get("exc_type").and_then(Value::as_str).map(str::to_string)
            } else {
                Some(message)
            }
        },
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ResultBackend for RedisResultBackend {
    async fn state(&self, task_id: &str) -> Result<TaskState, BackendError> {
        Ok(self
            .load(task_id)
            .await?
            .map_or(TaskState::Pending, |meta| TaskState::parse_lenient(&meta.status)))
    }

    async fn result(&self, task_id: &str) -> Result<Option<String>, BackendError> {
        Ok(self
            .load(task_id)
            .await?
            .and_then(|meta| render_result(&meta.result)))
    }
}
