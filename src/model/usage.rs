//! Usage counters and billing inputs for quota enforcement.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::serde::TenantId;

/// Quota-gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAction {
    /// Create a text post.
    CreatePost,
    /// Create an image post.
    CreateImage,
    /// Create a video post.
    CreateVideo,
    /// Publish automatically through the scheduler.
    AutoPost,
}

impl QuotaAction {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePost => "create_post",
            Self::CreateImage => "create_image",
            Self::CreateVideo => "create_video",
            Self::AutoPost => "auto_post",
        }
    }
}

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Free trial.
    Free,
    /// Entry plan.
    Starter,
    /// Growth plan.
    Pro,
    /// Multi-brand plan.
    Agency,
}

/// Billing facts for a tenant, supplied by the billing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    /// Active plan.
    pub plan: PlanTier,
    /// Current period start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Current period end (exclusive).
    pub period_end: DateTime<Utc>,
    /// Whether the auto-posting add-on is active.
    #[serde(default)]
    pub auto_post_addon: bool,
    /// Discount tier code, if any.
    #[serde(default)]
    pub discount_tier: Option<String>,
}

/// Consumption counters for one tenant and one billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Period start.
    pub period_start: DateTime<Utc>,
    /// Period end.
    pub period_end: DateTime<Utc>,
    /// Units consumed per action.
    pub counts: BTreeMap<QuotaAction, u32>,
}

impl UsageCounter {
    /// Zeroed counter for the snapshot's period.
    #[must_use]
    pub fn fresh(tenant_id: TenantId, billing: &BillingSnapshot) -> Self {
        Self {
            tenant_id,
            period_start: billing.period_start,
            period_end: billing.period_end,
            counts: BTreeMap::new(),
        }
    }

    /// Whether the counter belongs to the snapshot's billing period.
    #[must_use]
    pub fn matches_period(&self, billing: &BillingSnapshot) -> bool {
        self.period_start == billing.period_start && self.period_end == billing.period_end
    }

    /// Units consumed for `action`.
    #[must_use]
    pub fn count(&self, action: QuotaAction) -> u32 {
        self.counts.get(&action).copied().unwrap_or(0)
    }
}
