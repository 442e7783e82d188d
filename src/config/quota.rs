//! Plan limits for the quota ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{PlanTier, QuotaAction};

/// Caps of one plan tier; `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Text posts per period.
    pub max_posts: Option<u32>,
    /// Image posts per period.
    pub max_images: Option<u32>,
    /// Video posts per period.
    pub max_videos: Option<u32>,
    /// Whether auto-posting is part of the plan without the add-on.
    #[serde(default)]
    pub auto_post_included: bool,
    /// Auto-posts per period.
    #[serde(default)]
    pub max_auto_posts: Option<u32>,
}

impl PlanLimits {
    /// Cap for a content-creation action.
    #[must_use]
    pub const fn content_cap(&self, action: QuotaAction) -> Option<u32> {
        match action {
            QuotaAction::CreatePost => self.max_posts,
            QuotaAction::CreateImage => self.max_images,
            QuotaAction::CreateVideo => self.max_videos,
            QuotaAction::AutoPost => self.max_auto_posts,
        }
    }
}

/// Hard auto-post cap for tenants on a discount tier using the add-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountAutoPostCap {
    /// Discount tier code.
    pub discount_tier: String,
    /// Auto-posts per period.
    pub max_auto_posts: u32,
}

/// Quota ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Limits per plan tier.
    pub plans: BTreeMap<PlanTier, PlanLimits>,
    /// Discount tier + add-on caps, independent of the plan caps.
    #[serde(default)]
    pub discount_auto_post_caps: Vec<DiscountAutoPostCap>,
}

impl QuotaConfig {
    /// Validate quota configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message when no plan is configured or a discount tier is blank.
    pub fn validate(&self) -> Result<(), String> {
        if self.plans.is_empty() {
            return Err("at least one plan must be defined".into());
        }
        if self
            .discount_auto_post_caps
            .iter()
            .any(|c| c.discount_tier.trim().is_empty())
        {
            return Err("discount_tier must not be empty".into());
        }
        Ok(())
    }

    /// Discount cap for a tier, if configured.
    #[must_use]
    pub fn discount_cap(&self, tier: &str) -> Option<u32> {
        self.discount_auto_post_caps
            .iter()
            .find(|c| c.discount_tier.eq_ignore_ascii_case(tier))
            .map(|c| c.max_auto_posts)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let plans = BTreeMap::from([
            (
                PlanTier::Free,
                PlanLimits {
                    max_posts: Some(10),
                    max_images: Some(5),
                    max_videos: Some(0),
                    auto_post_included: false,
                    max_auto_posts: None,
                },
            ),
            (
                PlanTier::Starter,
                PlanLimits {
                    max_posts: Some(60),
                    max_images: Some(30),
                    max_videos: Some(5),
                    auto_post_included: false,
                    max_auto_posts: None,
                },
            ),
            (
                PlanTier::Pro,
                PlanLimits {
                    max_posts: Some(200),
                    max_images: Some(100),
                    max_videos: Some(20),
                    auto_post_included: true,
                    max_auto_posts: None,
                },
            ),
            (
                PlanTier::Agency,
                PlanLimits {
                    max_posts: None,
                    max_images: None,
                    max_videos: Some(100),
                    auto_post_included: true,
                    max_auto_posts: None,
                },
            ),
        ]);
        Self {
            plans,
            discount_auto_post_caps: vec![DiscountAutoPostCap {
                discount_tier: "founder".into(),
                max_auto_posts: 30,
            }],
        }
    }
}
