//! Job metadata record -- the typed view of `job:<id>:meta`.
//!
//! The hash is written by several processes (the submitter, the task body,
//! pollers) and may be partially populated or hold junk. [`JobMeta`] parses
//! every field independently: a bad field falls back to its default and
//! never poisons the rest of the record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::fields;

/// Parsed job metadata.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use jobtrack::domain::JobMeta;
///
/// let mut raw = HashMap::new();
/// raw.insert("model_name".to_string(), "voice-a".to_string());
/// raw.insert("progress".to_string(), "140".to_string());
/// raw.insert("total_epoch".to_string(), "ten".to_string());
///
/// let meta = JobMeta::from_fields("t1", &raw);
/// assert_eq!(meta.model_name, "voice-a");
/// assert_eq!(meta.progress, 100);
/// assert_eq!(meta.total_epoch, 0);
/// assert_eq!(meta.enqueued_at, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    /// Backend task id. Taken from the key when the field is absent.
    pub task_id: String,

    /// Model or job name shown to operators. Empty when unset.
    pub model_name: String,

    /// Unix seconds of first registration. `None` when absent or invalid.
    pub enqueued_at: Option<i64>,

    /// Explicit progress percent in `[0, 100]`; 0 means "not reported".
    pub progress: u8,

    /// Number of epochs the task body expects to run; 0 when unknown.
    pub total_epoch: u32,

    /// Status mirrored into the hash. Informational only: the result
    /// backend is authoritative.
    pub status: Option<String>,
}

impl JobMeta {
    /// Builds a record from raw hash fields.
    pub fn from_fields(task_id: &str, raw: &HashMap<String, String>) -> Self {
        let text = |name: &str| {
            raw.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            task_id: text(fields::TASK_ID).unwrap_or_else(|| task_id.to_string()),
            model_name: text(fields::MODEL_NAME).unwrap_or_default(),
            enqueued_at: parse_number(raw, fields::ENQUEUED_AT).filter(|ts| *ts > 0),
            progress: parse_number(raw, fields::PROGRESS).map_or(0, clamp_percent),
            total_epoch: parse_number(raw, fields::TOTAL_EPOCH)
                .map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
            status: text(fields::STATUS),
        }
    }

    /// Age in seconds relative to `now`, never negative.
    pub fn age_seconds(&self, now: i64) -> Option<i64> {
        self.enqueued_at.map(|enq| (now - enq).max(0))
    }
}

/// Clamps an integer to a `[0, 100]` percent.
pub fn clamp_percent(value: i64) -> u8 {
    // Lossless: the clamp bounds the value to u8 range.
    value.clamp(0, 100) as u8
}

/// Parses an integer field, accepting float text (rounded).
///
/// Missing, empty, or non-numeric values yield `None`.
fn parse_number(raw: &HashMap<String, String>, field: &str) -> Option<i64> {
    let value = raw.get(field)?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.round() as i64),
        _ => {
            tracing::debug!(field, value, "ignoring malformed numeric meta field");
            None
        },
    }
}
