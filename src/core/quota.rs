//! Quota ledger: per-billing-period usage counters and eligibility.
//!
//! Callers check before creating work and increment only after the work has
//! durably succeeded. [`QuotaLedger::increment`] re-checks under the ledger
//! lock, so a counter never passes its cap even under concurrent callers.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::QuotaConfig;
use crate::core::store::{BillingSource, UsageStore};
use crate::core::SchedulerError;
use crate::model::{BillingSnapshot, QuotaAction, UsageCounter};
use crate::util::serde::TenantId;

/// Answer to an eligibility query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Denial reason.
    pub reason: Option<String>,
    /// Units already consumed this period.
    pub used: u32,
    /// Effective cap, `None` for unlimited.
    pub limit: Option<u32>,
}

impl Eligibility {
    fn allow(used: u32, limit: Option<u32>) -> Self {
        Self {
            allowed: true,
            reason: None,
            used,
            limit,
        }
    }

    fn deny(reason: impl Into<String>, used: u32, limit: Option<u32>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            used,
            limit,
        }
    }
}

/// Usage accounting against plan limits.
pub struct QuotaLedger {
    config: QuotaConfig,
    usage: Arc<dyn UsageStore>,
    billing: Arc<dyn BillingSource>,
    lock: Mutex<()>,
}

impl QuotaLedger {
    /// Create a ledger over the given stores.
    pub fn new(
        config: QuotaConfig,
        usage: Arc<dyn UsageStore>,
        billing: Arc<dyn BillingSource>,
    ) -> Self {
        Self {
            config,
            usage,
            billing,
            lock: Mutex::new(()),
        }
    }

    /// Whether `tenant` may perform `action` now.
    ///
    /// # Errors
    ///
    /// Backend failures only; denials are reported in the result.
    pub fn check_eligibility(
        &self,
        tenant: &TenantId,
        action: QuotaAction,
    ) -> Result<Eligibility, SchedulerError> {
        let _guard = self.lock.lock();
        self.evaluate_locked(tenant, action)
    }

    /// Like [`Self::check_eligibility`] but as a precondition.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::QuotaExceeded`] with the denial reason.
    pub fn require(&self, tenant: &TenantId, action: QuotaAction) -> Result<(), SchedulerError> {
        let eligibility = self.check_eligibility(tenant, action)?;
        if eligibility.allowed {
            Ok(())
        } else {
            Err(SchedulerError::QuotaExceeded(
                eligibility.reason.unwrap_or_else(|| action.as_str().to_owned()),
            ))
        }
    }

    /// The tenant's counter for the live billing period, resetting a stale one.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] when the tenant has no billing period.
    pub fn get_or_create_counter(&self, tenant: &TenantId) -> Result<UsageCounter, SchedulerError> {
        let _guard = self.lock.lock();
        let billing = self.billing_for(tenant)?;
        self.counter_locked(tenant, &billing)
    }

    /// Consume one unit of `action`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::QuotaExceeded`] if the action is no longer allowed.
    pub fn increment(
        &self,
        tenant: &TenantId,
        action: QuotaAction,
    ) -> Result<UsageCounter, SchedulerError> {
        let _guard = self.lock.lock();
        let eligibility = self.evaluate_locked(tenant, action)?;
        if !eligibility.allowed {
            return Err(SchedulerError::QuotaExceeded(
                eligibility.reason.unwrap_or_else(|| action.as_str().to_owned()),
            ));
        }
        let billing = self.billing_for(tenant)?;
        let mut counter = self.counter_locked(tenant, &billing)?;
        *counter.counts.entry(action).or_insert(0) += 1;
        self.usage.save_usage_counter(&counter)?;
        tracing::debug!(
            tenant = %tenant,
            action = action.as_str(),
            used = counter.count(action),
            "usage incremented"
        );
        Ok(counter)
    }

    fn billing_for(&self, tenant: &TenantId) -> Result<BillingSnapshot, SchedulerError> {
        self.billing
            .billing_snapshot(tenant)?
            .ok_or_else(|| SchedulerError::NotFound(format!("billing period for tenant {tenant}")))
    }

    fn counter_locked(
        &self,
        tenant: &TenantId,
        billing: &BillingSnapshot,
    ) -> Result<UsageCounter, SchedulerError> {
        match self.usage.usage_counter(tenant)? {
            Some(counter) if counter.matches_period(billing) => Ok(counter),
            stale => {
                if stale.is_some() {
                    tracing::info!(tenant = %tenant, "billing period rolled over, resetting usage");
                }
                let counter = UsageCounter::fresh(tenant.clone(), billing);
                self.usage.save_usage_counter(&counter)?;
                Ok(counter)
            }
        }
    }

    fn evaluate_locked(
        &self,
        tenant: &TenantId,
        action: QuotaAction,
    ) -> Result<Eligibility, SchedulerError> {
        let Some(billing) = self.billing.billing_snapshot(tenant)? else {
            return Ok(Eligibility::deny("no active billing period", 0, Some(0)));
        };
        let counter = self.counter_locked(tenant, &billing)?;
        let used = counter.count(action);

        let Some(limits) = self.config.plans.get(&billing.plan) else {
            return Ok(Eligibility::deny(
                format!("plan {:?} is not configured", billing.plan),
                used,
                Some(0),
            ));
        };

        if action != QuotaAction::AutoPost {
            let cap = limits.content_cap(action);
            return Ok(match cap {
                Some(cap) if used >= cap => Eligibility::deny(
                    format!("{} limit of {cap} reached for this billing period", action.as_str()),
                    used,
                    Some(cap),
                ),
                _ => Eligibility::allow(used, cap),
            });
        }

        if !limits.auto_post_included && !billing.auto_post_addon {
            return Ok(Eligibility::deny(
                "auto-posting requires a plan or add-on that includes it",
                used,
                Some(0),
            ));
        }

        let discount_cap = billing
            .discount_tier
            .as_deref()
            .filter(|_| billing.auto_post_addon)
            .and_then(|tier| self.config.discount_cap(tier));
        let cap = match (limits.max_auto_posts, discount_cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Ok(match cap {
            Some(cap) if used >= cap => Eligibility::deny(
                format!("auto-post limit of {cap} reached for this billing period"),
                used,
                Some(cap),
            ),
            _ => Eligibility::allow(used, cap),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::{InMemoryStore, StaticBillingSource};
    use crate::model::PlanTier;
    use chrono::{DateTime, Utc};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn snapshot(plan: PlanTier, addon: bool, discount: Option<&str>) -> BillingSnapshot {
        BillingSnapshot {
            plan,
            period_start: utc("2030-03-01T00:00:00Z"),
            period_end: utc("2030-04-01T00:00:00Z"),
            auto_post_addon: addon,
            discount_tier: discount.map(str::to_owned),
        }
    }

    fn make_ledger(billing: BillingSnapshot) -> (QuotaLedger, Arc<StaticBillingSource>) {
        let store = Arc::new(InMemoryStore::new());
        let source = Arc::new(StaticBillingSource::new());
        source.set("t1".into(), billing);
        (
            QuotaLedger::new(QuotaConfig::default(), store, source.clone()),
            source,
        )
    }

    #[test]
    fn content_cap_is_enforced() {
        let (ledger, _) = make_ledger(snapshot(PlanTier::Free, false, None));
        let tenant: TenantId = "t1".into();
        for _ in 0..5 {
            assert!(ledger.check_eligibility(&tenant, QuotaAction::CreateImage).unwrap().allowed);
            ledger.increment(&tenant, QuotaAction::CreateImage).unwrap();
        }
        let denied = ledger.check_eligibility(&tenant, QuotaAction::CreateImage).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.used, 5);
        assert!(matches!(
            ledger.increment(&tenant, QuotaAction::CreateImage),
            Err(SchedulerError::QuotaExceeded(_))
        ));
        assert_eq!(
            ledger.get_or_create_counter(&tenant).unwrap().count(QuotaAction::CreateImage),
            5
        );
    }

    #[test]
    fn auto_post_requires_plan_or_addon() {
        let (ledger, _) = make_ledger(snapshot(PlanTier::Starter, false, None));
        let tenant: TenantId = "t1".into();
        assert!(!ledger.check_eligibility(&tenant, QuotaAction::AutoPost).unwrap().allowed);

        let (ledger, _) = make_ledger(snapshot(PlanTier::Starter, true, None));
        assert!(ledger.check_eligibility(&tenant, QuotaAction::AutoPost).unwrap().allowed);

        let (ledger, _) = make_ledger(snapshot(PlanTier::Pro, false, None));
        assert!(ledger.check_eligibility(&tenant, QuotaAction::AutoPost).unwrap().allowed);
    }

    #[test]
    fn discount_tier_with_addon_has_hard_cap() {
        let (ledger, _) = make_ledger(snapshot(PlanTier::Starter, true, Some("founder")));
        let tenant: TenantId = "t1".into();
        for _ in 0..30 {
            ledger.increment(&tenant, QuotaAction::AutoPost).unwrap();
        }
        let denied = ledger.check_eligibility(&tenant, QuotaAction::AutoPost).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.limit, Some(30));
        // independent of the content cap
        assert!(ledger.check_eligibility(&tenant, QuotaAction::CreatePost).unwrap().allowed);
    }

    #[test]
    fn counter_resets_when_period_rolls_over() {
        let (ledger, source) = make_ledger(snapshot(PlanTier::Pro, false, None));
        let tenant: TenantId = "t1".into();
        ledger.increment(&tenant, QuotaAction::CreatePost).unwrap();
        assert_eq!(
            ledger.get_or_create_counter(&tenant).unwrap().count(QuotaAction::CreatePost),
            1
        );

        let mut next = snapshot(PlanTier::Pro, false, None);
        next.period_start = utc("2030-04-01T00:00:00Z");
        next.period_end = utc("2030-05-01T00:00:00Z");
        source.set(tenant.clone(), next);

        let counter = ledger.get_or_create_counter(&tenant).unwrap();
        assert_eq!(counter.count(QuotaAction::CreatePost), 0);
        assert_eq!(counter.period_start, utc("2030-04-01T00:00:00Z"));
    }

    #[test]
    fn missing_billing_period_denies() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = QuotaLedger::new(
            QuotaConfig::default(),
            store,
            Arc::new(StaticBillingSource::new()),
        );
        let e = ledger
            .check_eligibility(&"ghost".into(), QuotaAction::CreatePost)
            .unwrap();
        assert!(!e.allowed);
        assert!(ledger.get_or_create_counter(&"ghost".into()).is_err());
    }
}
