//! In-memory persistence for development and testing.
//!
//! All tables sit behind one `RwLock`, so every write method is a single
//! atomic transaction.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::store::{
    BillingSource, CommittedBatch, ContentStore, DestinationStore, RuleStore, ScheduleBatch,
    ScheduleStore, UsageStore,
};
use crate::core::SchedulerError;
use crate::model::{
    BillingSnapshot, ContentItem, ContentStatus, DestinationProfile, PostingRule, ScheduleItem,
    ScheduleStatus, UsageCounter,
};
use crate::util::serde::{ContentId, ScheduleItemId, TenantId};

#[derive(Default)]
struct Tables {
    content: HashMap<ContentId, ContentItem>,
    profiles: HashMap<TenantId, DestinationProfile>,
    rules: HashMap<TenantId, PostingRule>,
    schedules: HashMap<ScheduleItemId, ScheduleItem>,
    usage: HashMap<TenantId, UsageCounter>,
}

/// In-memory implementation of every store contract.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a content item.
    pub fn put_content(&self, item: ContentItem) {
        self.tables.write().content.insert(item.id.clone(), item);
    }

    /// Insert or replace a destination profile (verification workflow output).
    pub fn put_destination_profile(&self, profile: DestinationProfile) {
        self.tables
            .write()
            .profiles
            .insert(profile.tenant_id.clone(), profile);
    }

    /// Insert or replace a posting rule.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidPostingRule`] when the rule is invalid.
    pub fn put_posting_rule(&self, rule: PostingRule) -> Result<(), SchedulerError> {
        rule.validate()?;
        self.tables.write().rules.insert(rule.tenant_id.clone(), rule);
        Ok(())
    }

    /// Number of stored schedule rows.
    #[must_use]
    pub fn schedule_count(&self) -> usize {
        self.tables.read().schedules.len()
    }
}

impl ContentStore for InMemoryStore {
    fn content(&self, id: &ContentId) -> Result<Option<ContentItem>, SchedulerError> {
        Ok(self.tables.read().content.get(id).cloned())
    }

    fn set_content_status(
        &self,
        id: &ContentId,
        status: ContentStatus,
    ) -> Result<(), SchedulerError> {
        let mut tables = self.tables.write();
        let item = tables
            .content
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(format!("content item {id}")))?;
        item.status = status;
        Ok(())
    }
}

impl DestinationStore for InMemoryStore {
    fn destination_profile(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<DestinationProfile>, SchedulerError> {
        Ok(self.tables.read().profiles.get(tenant).cloned())
    }
}

impl RuleStore for InMemoryStore {
    fn posting_rule(&self, tenant: &TenantId) -> Result<Option<PostingRule>, SchedulerError> {
        Ok(self.tables.read().rules.get(tenant).cloned())
    }
}

impl ScheduleStore for InMemoryStore {
    fn commit_schedule(&self, batch: ScheduleBatch) -> Result<CommittedBatch, SchedulerError> {
        let mut tables = self.tables.write();

        if let Some(missing) = batch
            .content_ids
            .iter()
            .find(|id| !tables.content.contains_key(*id))
        {
            return Err(SchedulerError::NotFound(format!("content item {missing}")));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &batch.items {
            if !batch.content_ids.contains(item.content_id()) {
                return Err(SchedulerError::InvalidState(format!(
                    "schedule item {} belongs to content {} outside the batch",
                    item.id(),
                    item.content_id()
                )));
            }
            if !seen.insert((item.content_id().clone(), item.platform())) {
                return Err(SchedulerError::InvalidState(format!(
                    "duplicate active schedule for content {} on {}",
                    item.content_id(),
                    item.platform()
                )));
            }
        }

        if let Some(kept) = tables.schedules.values().find(|s| {
            s.status() == ScheduleStatus::Published
                && seen.contains(&(s.content_id().clone(), s.platform()))
        }) {
            return Err(SchedulerError::InvalidState(format!(
                "content {} is already published on {}",
                kept.content_id(),
                kept.platform()
            )));
        }

        let superseded: Vec<ScheduleItemId> = tables
            .schedules
            .values()
            .filter(|s| {
                batch.content_ids.contains(s.content_id())
                    && s.status() != ScheduleStatus::Published
            })
            .map(ScheduleItem::id)
            .collect();
        for id in &superseded {
            tables.schedules.remove(id);
        }
        for item in &batch.items {
            tables.schedules.insert(item.id(), item.clone());
        }
        for id in &batch.content_ids {
            if let Some(content) = tables.content.get_mut(id) {
                content.status = ContentStatus::Scheduled;
            }
        }

        Ok(CommittedBatch {
            inserted: batch.items,
            superseded,
        })
    }

    fn schedule_item(&self, id: ScheduleItemId) -> Result<Option<ScheduleItem>, SchedulerError> {
        Ok(self.tables.read().schedules.get(&id).cloned())
    }

    fn save_schedule_item(&self, item: &ScheduleItem) -> Result<(), SchedulerError> {
        let mut tables = self.tables.write();
        let existing = tables
            .schedules
            .get_mut(&item.id())
            .ok_or_else(|| SchedulerError::NotFound(format!("schedule item {}", item.id())))?;
        if existing.frozen_destination_id() != item.frozen_destination_id() {
            return Err(SchedulerError::InvalidState(format!(
                "frozen destination of schedule item {} is immutable",
                item.id()
            )));
        }
        *existing = item.clone();
        Ok(())
    }

    fn items_for_content(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<ScheduleItem>, SchedulerError> {
        let mut items: Vec<ScheduleItem> = self
            .tables
            .read()
            .schedules
            .values()
            .filter(|s| s.content_id() == content_id)
            .cloned()
            .collect();
        items.sort_by_key(ScheduleItem::scheduled_for);
        Ok(items)
    }

    fn items_for_tenant(&self, tenant: &TenantId) -> Result<Vec<ScheduleItem>, SchedulerError> {
        let mut items: Vec<ScheduleItem> = self
            .tables
            .read()
            .schedules
            .values()
            .filter(|s| s.tenant_id() == tenant)
            .cloned()
            .collect();
        items.sort_by_key(ScheduleItem::scheduled_for);
        Ok(items)
    }

    fn item_by_provider_job(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<ScheduleItem>, SchedulerError> {
        Ok(self
            .tables
            .read()
            .schedules
            .values()
            .find(|s| s.provider_job_id() == Some(provider_job_id))
            .cloned())
    }

    fn queued_items(&self) -> Result<Vec<ScheduleItem>, SchedulerError> {
        Ok(self
            .tables
            .read()
            .schedules
            .values()
            .filter(|s| s.status() == ScheduleStatus::Queued)
            .cloned()
            .collect())
    }
}

impl UsageStore for InMemoryStore {
    fn usage_counter(&self, tenant: &TenantId) -> Result<Option<UsageCounter>, SchedulerError> {
        Ok(self.tables.read().usage.get(tenant).cloned())
    }

    fn save_usage_counter(&self, counter: &UsageCounter) -> Result<(), SchedulerError> {
        self.tables
            .write()
            .usage
            .insert(counter.tenant_id.clone(), counter.clone());
        Ok(())
    }
}

/// Billing source backed by a fixed map of snapshots.
#[derive(Default)]
pub struct StaticBillingSource {
    snapshots: RwLock<HashMap<TenantId, BillingSnapshot>>,
}

impl StaticBillingSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tenant's billing snapshot.
    pub fn set(&self, tenant: TenantId, snapshot: BillingSnapshot) {
        self.snapshots.write().insert(tenant, snapshot);
    }
}

impl BillingSource for StaticBillingSource {
    fn billing_snapshot(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<BillingSnapshot>, SchedulerError> {
        Ok(self.snapshots.read().get(tenant).cloned())
    }
}
