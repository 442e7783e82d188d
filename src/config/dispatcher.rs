//! Dispatcher retry policy and job store selection.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Job store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobStoreConfig {
    /// In-memory store; pending jobs are lost on restart.
    InMemory,
    /// JSON-lines file store that survives restarts.
    File {
        /// Directory holding the store files.
        path: PathBuf,
        /// Stream (file stem) name.
        #[serde(default = "default_stream")]
        stream: String,
    },
}

fn default_stream() -> String {
    "publish-jobs".into()
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Executions per job before a retryable failure becomes terminal.
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub max_backoff_ms: u64,
    /// Maximum number of pending jobs.
    pub max_pending: usize,
    /// Longest single timer sleep in milliseconds; bounds how late a job
    /// fires after the clock jumps forward.
    pub max_timer_sleep_ms: u64,
    /// Where pending jobs are persisted.
    pub job_store: JobStoreConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 30_000,
            max_backoff_ms: 15 * 60 * 1000,
            max_pending: 100_000,
            max_timer_sleep_ms: 60_000,
            job_store: JobStoreConfig::InMemory,
        }
    }
}

impl DispatcherConfig {
    /// Delay before attempt `attempt + 1`: `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base_ms.saturating_mul(1_u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Longest single timer sleep.
    #[must_use]
    pub const fn max_timer_sleep(&self) -> Duration {
        Duration::from_millis(self.max_timer_sleep_ms)
    }

    /// Validate dispatcher configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.max_backoff_ms < self.backoff_base_ms {
            return Err("max_backoff_ms must be >= backoff_base_ms".into());
        }
        if self.max_pending == 0 {
            return Err("max_pending must be greater than 0".into());
        }
        if self.max_timer_sleep_ms == 0 {
            return Err("max_timer_sleep_ms must be greater than 0".into());
        }
        if let JobStoreConfig::File { stream, .. } = &self.job_store {
            if stream.trim().is_empty() {
                return Err("job_store.stream must not be empty".into());
            }
        }
        Ok(())
    }
}
