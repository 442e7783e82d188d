//! Root engine configuration and environment overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{DispatcherConfig, JobStoreConfig, QuotaConfig, WorkerPoolConfig};

/// HTTP posting provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; requests go to `{base_url}/post`.
    pub base_url: String,
    /// Bearer key sent with each request.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    /// Validate provider settings.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("base_url must be http(s): {}", self.base_url));
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for a scheduling engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Publish worker pool.
    pub workers: WorkerPoolConfig,
    /// Delayed job dispatcher.
    pub dispatcher: DispatcherConfig,
    /// Plan limits.
    pub quota: QuotaConfig,
    /// Posting provider.
    pub provider: ProviderConfig,
}

impl EngineConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section error, prefixed with the section name.
    pub fn validate(&self) -> Result<(), String> {
        self.workers
            .validate()
            .map_err(|e| format!("workers invalid: {e}"))?;
        self.dispatcher
            .validate()
            .map_err(|e| format!("dispatcher invalid: {e}"))?;
        self.quota
            .validate()
            .map_err(|e| format!("quota invalid: {e}"))?;
        self.provider
            .validate()
            .map_err(|e| format!("provider invalid: {e}"))?;
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `PUBLISHER_*` variables, after loading `.env`.
    ///
    /// # Errors
    ///
    /// Returns a message for unparsable variables or an invalid result.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply overrides from `lookup`, then validate.
    ///
    /// Recognised keys: `PUBLISHER_WORKERS`, `PUBLISHER_MAX_ATTEMPTS`,
    /// `PUBLISHER_BACKOFF_BASE_MS`, `PUBLISHER_MAX_BACKOFF_MS`,
    /// `PUBLISHER_JOB_STORE_PATH`, `PUBLISHER_PROVIDER_URL`,
    /// `PUBLISHER_PROVIDER_KEY`, `PUBLISHER_PROVIDER_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns a message for unparsable variables or an invalid result.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key} invalid: {e}"))
        }

        if let Some(raw) = lookup("PUBLISHER_WORKERS") {
            self.workers.worker_count = parsed("PUBLISHER_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("PUBLISHER_MAX_ATTEMPTS") {
            self.dispatcher.max_attempts = parsed("PUBLISHER_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("PUBLISHER_BACKOFF_BASE_MS") {
            self.dispatcher.backoff_base_ms = parsed("PUBLISHER_BACKOFF_BASE_MS", &raw)?;
        }
        if let Some(raw) = lookup("PUBLISHER_MAX_BACKOFF_MS") {
            self.dispatcher.max_backoff_ms = parsed("PUBLISHER_MAX_BACKOFF_MS", &raw)?;
        }
        if let Some(raw) = lookup("PUBLISHER_JOB_STORE_PATH") {
            self.dispatcher.job_store = JobStoreConfig::File {
                path: PathBuf::from(raw),
                stream: "publish-jobs".into(),
            };
        }
        if let Some(raw) = lookup("PUBLISHER_PROVIDER_URL") {
            self.provider.base_url = raw.trim_end_matches('/').to_owned();
        }
        if let Some(raw) = lookup("PUBLISHER_PROVIDER_KEY") {
            self.provider.api_key = Some(raw);
        }
        if let Some(raw) = lookup("PUBLISHER_PROVIDER_TIMEOUT_SECS") {
            self.provider.timeout_secs = parsed("PUBLISHER_PROVIDER_TIMEOUT_SECS", &raw)?;
        }
        self.validate()
    }
}
