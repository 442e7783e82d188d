//! Verified provider destinations per tenant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::serde::{Platform, TenantId};

/// Verification state of a destination profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationStatus {
    /// Linked accounts verified; scheduling allowed.
    Verified,
    /// Tenant must reconnect before scheduling.
    NeedsReconnect,
}

/// Current provider-side identifiers of a tenant, one per platform.
///
/// Written only by the external verification workflow; the engine reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationProfile {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Verification state.
    pub status: DestinationStatus,
    /// When the profile was last verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Provider-side destination id per platform.
    pub platform_ids: BTreeMap<Platform, String>,
}

impl DestinationProfile {
    /// A verified profile with the given ids.
    pub fn verified(
        tenant_id: impl Into<TenantId>,
        ids: impl IntoIterator<Item = (Platform, String)>,
        verified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            status: DestinationStatus::Verified,
            verified_at: Some(verified_at),
            platform_ids: ids.into_iter().collect(),
        }
    }

    /// Whether scheduling against this profile is permitted.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == DestinationStatus::Verified
    }

    /// Destination id for `platform`, ignoring blank entries.
    #[must_use]
    pub fn destination_for(&self, platform: Platform) -> Option<&str> {
        self.platform_ids
            .get(&platform)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }
}
