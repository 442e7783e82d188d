//! Destination registry glue.
//!
//! One place decides which provider id a tenant's profile yields for a
//! platform, so scheduling (freeze) and publishing (freshness check) agree.

use std::sync::Arc;

use crate::core::store::DestinationStore;
use crate::core::SchedulerError;
use crate::model::DestinationProfile;
use crate::util::serde::{Platform, TenantId};

/// Read-only view over destination profiles.
#[derive(Clone)]
pub struct DestinationRegistry {
    store: Arc<dyn DestinationStore>,
}

impl DestinationRegistry {
    /// Wrap a destination store.
    pub fn new(store: Arc<dyn DestinationStore>) -> Self {
        Self { store }
    }

    /// The tenant's current profile, read fresh from the store.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn current_profile(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<DestinationProfile>, SchedulerError> {
        self.store.destination_profile(tenant)
    }

    /// The tenant's profile if it exists and is verified.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DestinationNotVerified`] when the profile is missing
    /// or needs a reconnect.
    pub fn verified_profile(&self, tenant: &TenantId) -> Result<DestinationProfile, SchedulerError> {
        match self.current_profile(tenant)? {
            Some(profile) if profile.is_verified() => Ok(profile),
            _ => Err(SchedulerError::DestinationNotVerified(tenant.clone())),
        }
    }

    /// Destination id the profile would use for `platform`.
    #[must_use]
    pub fn resolve(profile: &DestinationProfile, platform: Platform) -> Option<String> {
        profile.destination_for(platform).map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::InMemoryStore;
    use crate::model::DestinationStatus;
    use chrono::Utc;

    fn registry_with(profile: Option<DestinationProfile>) -> DestinationRegistry {
        let store = Arc::new(InMemoryStore::new());
        if let Some(profile) = profile {
            store.put_destination_profile(profile);
        }
        DestinationRegistry::new(store)
    }

    #[test]
    fn missing_or_unverified_profile_is_rejected() {
        let err = registry_with(None).verified_profile(&"t1".into()).unwrap_err();
        assert!(matches!(err, SchedulerError::DestinationNotVerified(_)));

        let mut profile =
            DestinationProfile::verified("t1", [(Platform::Facebook, "fb-1".into())], Utc::now());
        profile.status = DestinationStatus::NeedsReconnect;
        let err = registry_with(Some(profile))
            .verified_profile(&"t1".into())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DestinationNotVerified(_)));
    }

    #[test]
    fn resolve_skips_blank_ids() {
        let profile = DestinationProfile::verified(
            "t1",
            [
                (Platform::Facebook, "fb-1".into()),
                (Platform::Instagram, "  ".into()),
            ],
            Utc::now(),
        );
        let registry = registry_with(Some(profile));
        let profile = registry.verified_profile(&"t1".into()).unwrap();
        assert_eq!(
            DestinationRegistry::resolve(&profile, Platform::Facebook).as_deref(),
            Some("fb-1")
        );
        assert_eq!(DestinationRegistry::resolve(&profile, Platform::Instagram), None);
        assert_eq!(DestinationRegistry::resolve(&profile, Platform::Tiktok), None);
    }
}
