//! Error types for scheduling and publishing operations.

use thiserror::Error;

use crate::util::serde::TenantId;

/// Errors surfaced synchronously to callers of the engine.
///
/// Precondition variants are never retried automatically; their `Display`
/// output is the reason string returned to the caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The tenant's destination profile is missing or not verified.
    #[error("destination not verified for tenant {0}")]
    DestinationNotVerified(TenantId),
    /// The tenant has no posting rule.
    #[error("posting rule missing for tenant {0}")]
    PostingRuleMissing(TenantId),
    /// None of the requested content items can be scheduled.
    #[error("no eligible content: none of the requested items is approved")]
    NoEligibleContent,
    /// Posting rule failed validation.
    #[error("invalid posting rule: {0}")]
    InvalidPostingRule(String),
    /// A usage quota denies the action.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Entity is in a state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Queue is full for the target backend.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Stable machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DestinationNotVerified(_) => "DestinationNotVerified",
            Self::PostingRuleMissing(_) => "PostingRuleMissing",
            Self::NoEligibleContent => "NoEligibleContent",
            Self::InvalidPostingRule(_) => "InvalidPostingRule",
            Self::QuotaExceeded(_) => "QuotaExceeded",
            Self::NotFound(_) => "NotFound",
            Self::InvalidState(_) => "InvalidState",
            Self::QueueFull(_) => "QueueFull",
            Self::Backend(_) => "Backend",
            Self::Config(_) => "Config",
        }
    }

    /// Whether the error is a caller-facing precondition failure.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::DestinationNotVerified(_)
                | Self::PostingRuleMissing(_)
                | Self::NoEligibleContent
                | Self::InvalidPostingRule(_)
                | Self::QuotaExceeded(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
