//! Social-posting provider contract.
//!
//! The provider answers with a tagged [`ProviderResponse`]; transport-level
//! problems are [`ProviderError`]s, classified by
//! [`ProviderError::is_retryable`] for the dispatcher's retry policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::serde::Platform;

/// What is sent to the provider for one schedule item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Frozen destination id of the schedule item.
    pub destination_id: String,
    /// Target platform.
    pub platform: Platform,
    /// Caption plus hashtags.
    pub text: String,
    /// Public media URLs.
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// Schedule item id, so the provider can deduplicate retries.
    pub idempotency_key: String,
}

/// Per-platform result reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResult {
    /// Platform name as reported by the provider.
    pub platform: String,
    /// Provider status string, e.g. `success` or `pending`.
    pub status: String,
    /// Provider-side post id.
    #[serde(default)]
    pub post_id: Option<String>,
    /// Public URL of the post.
    #[serde(default)]
    pub post_url: Option<String>,
}

/// Error entry reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIssue {
    /// Platform the error applies to, if any.
    #[serde(default)]
    pub platform: Option<String>,
    /// Provider error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

/// Tagged provider answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Whether the provider accepted the post.
    pub success: bool,
    /// Provider job id, used by asynchronous callbacks.
    #[serde(default)]
    pub provider_job_id: Option<String>,
    /// Results per platform.
    #[serde(default)]
    pub per_platform: Vec<PlatformResult>,
    /// Errors reported alongside or instead of results.
    #[serde(default)]
    pub errors: Vec<ProviderIssue>,
}

impl ProviderResponse {
    /// An accepted post with a job id.
    #[must_use]
    pub fn accepted(provider_job_id: impl Into<String>, post_url: Option<String>) -> Self {
        Self {
            success: true,
            provider_job_id: Some(provider_job_id.into()),
            per_platform: post_url
                .map(|url| PlatformResult {
                    platform: String::new(),
                    status: "success".into(),
                    post_id: None,
                    post_url: Some(url),
                })
                .into_iter()
                .collect(),
            errors: Vec::new(),
        }
    }

    /// First post URL among the platform results.
    #[must_use]
    pub fn post_url(&self) -> Option<String> {
        self.per_platform.iter().find_map(|r| r.post_url.clone())
    }

    /// All error messages joined, or a generic message.
    #[must_use]
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "provider reported failure without details".into();
        }
        self.errors
            .iter()
            .map(|e| match (&e.platform, &e.code) {
                (Some(p), Some(c)) => format!("[{p}/{c}] {}", e.message),
                (Some(p), None) => format!("[{p}] {}", e.message),
                (None, Some(c)) => format!("[{c}] {}", e.message),
                (None, None) => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Failure to get an answer from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Provider throttled the request.
    #[error("rate limited")]
    RateLimited {
        /// Seconds suggested by the provider.
        retry_after_secs: Option<u64>,
    },
    /// Unexpected HTTP status.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// Provider refused the post.
    #[error("provider rejected post: {0}")]
    Rejected(String),
    /// Response body could not be decoded.
    #[error("undecodable provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

/// External social-posting provider.
#[async_trait]
pub trait PostingProvider: Send + Sync {
    /// Publish one post to `request.destination_id`.
    ///
    /// # Errors
    ///
    /// [`ProviderError`] when no usable answer was obtained.
    async fn publish(&self, request: PublishRequest) -> Result<ProviderResponse, ProviderError>;
}
