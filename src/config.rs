//! Job tracking configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.jobtrack.toml`)
//! 2. Environment variables (with `JOBTRACK_` prefix, plus
//!    `JOB_INDEX_REDIS_URL` for the index store)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [jobtrack]
//! redis_url = "redis://redis:6379/2"
//! finished_capacity = 200
//! log_tail_lines = 200
//! snapshot_max_limit = 50
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_FINISHED_CAPACITY, DEFAULT_FINISHED_RECENT, DEFAULT_LOG_MAX_LINES,
    DEFAULT_LOG_TAIL_LINES, DEFAULT_MODEL_NAME_MAX_CHARS, DEFAULT_RECENT_CAPACITY,
    DEFAULT_SNAPSHOT_LIMIT, MAX_SNAPSHOT_LIMIT,
};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".jobtrack.toml";

/// Settings for the local queue, the job index, and the monitoring views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTrackConfig {
    /// URL of the store holding the job index. `None` disables it.
    pub redis_url: Option<String>,

    /// URL of the task-result backend, when it differs from `redis_url`.
    pub result_backend_url: Option<String>,

    /// Optional namespace prepended to every index key.
    pub key_prefix: Option<String>,

    /// Finished local tasks kept before the oldest are dropped.
    pub finished_capacity: usize,

    /// Finished local tasks included in a local snapshot.
    pub finished_recent: usize,

    /// Trailing log lines returned by a poll.
    pub log_tail_lines: usize,

    /// Maximum log lines kept per job.
    pub log_max_lines: usize,

    /// Snapshot size used when the caller passes none.
    pub snapshot_default_limit: usize,

    /// Hard cap on snapshot size.
    pub snapshot_max_limit: usize,

    /// Model names are clipped to this many characters in snapshots.
    pub model_name_max_chars: usize,

    /// Length of the recent-jobs list.
    pub recent_capacity: usize,
}

impl Default for JobTrackConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            result_backend_url: None,
            key_prefix: None,
            finished_capacity: DEFAULT_FINISHED_CAPACITY,
            finished_recent: DEFAULT_FINISHED_RECENT,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
            log_max_lines: DEFAULT_LOG_MAX_LINES,
            snapshot_default_limit: DEFAULT_SNAPSHOT_LIMIT,
            snapshot_max_limit: MAX_SNAPSHOT_LIMIT,
            model_name_max_chars: DEFAULT_MODEL_NAME_MAX_CHARS,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

impl JobTrackConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `.jobtrack.toml` in the working directory
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content (the `[jobtrack]` table).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            jobtrack: JobTrackConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.jobtrack)
    }

    /// Rejects settings that would make the queue or snapshots unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("finished_capacity", self.finished_capacity),
            ("log_tail_lines", self.log_tail_lines),
            ("log_max_lines", self.log_max_lines),
            ("snapshot_max_limit", self.snapshot_max_limit),
            ("recent_capacity", self.recent_capacity),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("JOB_INDEX_REDIS_URL") {
            self.redis_url = Some(url);
        } else if let Ok(url) = std::env::var("JOBTRACK_REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Ok(url) = std::env::var("JOBTRACK_RESULT_BACKEND_URL") {
            self.result_backend_url = Some(url);
        }
        if let Ok(prefix) = std::env::var("JOBTRACK_KEY_PREFIX") {
            self.key_prefix = Some(prefix);
        }

        let numeric = [
            ("JOBTRACK_FINISHED_CAPACITY", &mut self.finished_capacity),
            ("JOBTRACK_FINISHED_RECENT", &mut self.finished_recent),
            ("JOBTRACK_LOG_TAIL_LINES", &mut self.log_tail_lines),
            ("JOBTRACK_LOG_MAX_LINES", &mut self.log_max_lines),
            ("JOBTRACK_SNAPSHOT_DEFAULT_LIMIT", &mut self.snapshot_default_limit),
            ("JOBTRACK_SNAPSHOT_MAX_LIMIT", &mut self.snapshot_max_limit),
            ("JOBTRACK_MODEL_NAME_MAX_CHARS", &mut self.model_name_max_chars),
            ("JOBTRACK_RECENT_CAPACITY", &mut self.recent_capacity),
        ];
        for (var, slot) in numeric {
            if let Ok(raw) = std::env::var(var) {
                if let Ok(v) = raw.trim().parse() {
                    *slot = v;
                }
            }
        }
    }

    /// Result backend URL, falling back to the index store URL.
    pub fn result_backend_url(&self) -> Option<&str> {
        self.result_backend_url
            .as_deref()
            .or(self.redis_url.as_deref())
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading configuration file.
    #[error("Failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },
    /// Parse error in configuration.
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
