//! Read/write contracts of the persistence layer.
//!
//! The engine is storage-agnostic; adapters live under `infra::store`.
//! Implementations must make [`ScheduleStore::commit_schedule`] atomic
//! together with the content status flip it performs.

use crate::core::SchedulerError;
use crate::model::{
    BillingSnapshot, ContentItem, ContentStatus, DestinationProfile, PostingRule, ScheduleItem,
    UsageCounter,
};
use crate::util::serde::{ContentId, ScheduleItemId, TenantId};

/// Content store (external collaborator).
pub trait ContentStore: Send + Sync {
    /// Load a content item.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn content(&self, id: &ContentId) -> Result<Option<ContentItem>, SchedulerError>;

    /// Transition a content item's status.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] for unknown items, or backend failures.
    fn set_content_status(&self, id: &ContentId, status: ContentStatus)
        -> Result<(), SchedulerError>;
}

/// Destination profiles written by the verification workflow.
pub trait DestinationStore: Send + Sync {
    /// Current profile of a tenant.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn destination_profile(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<DestinationProfile>, SchedulerError>;
}

/// Posting rules, one per tenant.
pub trait RuleStore: Send + Sync {
    /// Posting rule of a tenant.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn posting_rule(&self, tenant: &TenantId) -> Result<Option<PostingRule>, SchedulerError>;
}

/// New schedule rows for a set of content items.
#[derive(Debug, Clone, Default)]
pub struct ScheduleBatch {
    /// Content items being (re-)scheduled; their old rows are replaced.
    pub content_ids: Vec<ContentId>,
    /// Rows to insert.
    pub items: Vec<ScheduleItem>,
}

/// Result of a committed batch.
#[derive(Debug, Clone, Default)]
pub struct CommittedBatch {
    /// Rows inserted.
    pub inserted: Vec<ScheduleItem>,
    /// Rows deleted because their content item was re-scheduled.
    pub superseded: Vec<ScheduleItemId>,
}

/// Schedule item persistence.
pub trait ScheduleStore: Send + Sync {
    /// Atomically delete existing rows of `batch.content_ids` except
    /// published ones, insert `batch.items`, and set those content items to
    /// `Scheduled`.
    ///
    /// # Errors
    ///
    /// Fails without side effects when the batch violates "one queued row
    /// per content item and platform", re-pairs a platform the content is
    /// already published on, or names an unknown content item.
    fn commit_schedule(&self, batch: ScheduleBatch) -> Result<CommittedBatch, SchedulerError>;

    /// Load one row.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn schedule_item(&self, id: ScheduleItemId) -> Result<Option<ScheduleItem>, SchedulerError>;

    /// Persist a mutated row.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] for deleted rows and
    /// [`SchedulerError::InvalidState`] if the frozen destination differs.
    fn save_schedule_item(&self, item: &ScheduleItem) -> Result<(), SchedulerError>;

    /// Rows of one content item.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn items_for_content(&self, content_id: &ContentId)
        -> Result<Vec<ScheduleItem>, SchedulerError>;

    /// Rows of one tenant, ordered by `scheduled_for`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn items_for_tenant(&self, tenant: &TenantId) -> Result<Vec<ScheduleItem>, SchedulerError>;

    /// Row dispatched under a provider job id.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn item_by_provider_job(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<ScheduleItem>, SchedulerError>;

    /// Every row still `Queued`, across tenants.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn queued_items(&self) -> Result<Vec<ScheduleItem>, SchedulerError>;
}

/// Usage counter persistence.
pub trait UsageStore: Send + Sync {
    /// Stored counter of a tenant, whatever its period.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn usage_counter(&self, tenant: &TenantId) -> Result<Option<UsageCounter>, SchedulerError>;

    /// Replace the tenant's counter.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn save_usage_counter(&self, counter: &UsageCounter) -> Result<(), SchedulerError>;
}

/// Billing facts (external collaborator).
pub trait BillingSource: Send + Sync {
    /// Current plan and billing period of a tenant.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn billing_snapshot(&self, tenant: &TenantId)
        -> Result<Option<BillingSnapshot>, SchedulerError>;
}
