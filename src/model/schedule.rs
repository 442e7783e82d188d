//! Schedule items: one platform-specific publish work-order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ContentStatus;
use crate::util::serde::{ContentId, Platform, ScheduleItemId, TenantId};

/// Lifecycle of a schedule item.
///
/// `Queued` spans both "waiting for its slot" and "fired, in flight".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    /// Waiting to fire or executing.
    Queued,
    /// Provider accepted the post.
    Published,
    /// Terminal failure; see `error_message`.
    Failed,
    /// Cancelled before firing.
    Cancelled,
}

impl ScheduleStatus {
    /// Whether no further transition is expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// A platform-specific publish of one content item at one instant.
///
/// The destination id is frozen at creation: there is no setter, and the
/// store rejects writes that would change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    id: ScheduleItemId,
    tenant_id: TenantId,
    content_id: ContentId,
    platform: Platform,
    scheduled_for: DateTime<Utc>,
    frozen_destination_id: String,
    provider_job_id: Option<String>,
    result_url: Option<String>,
    status: ScheduleStatus,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScheduleItem {
    /// Create a queued item, freezing `destination_id`.
    pub fn new(
        tenant_id: TenantId,
        content_id: ContentId,
        platform: Platform,
        scheduled_for: DateTime<Utc>,
        destination_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleItemId::new(),
            tenant_id,
            content_id,
            platform,
            scheduled_for,
            frozen_destination_id: destination_id.into(),
            provider_job_id: None,
            result_url: None,
            status: ScheduleStatus::Queued,
            error_message: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> ScheduleItemId {
        self.id
    }

    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Content item published by this schedule.
    #[must_use]
    pub const fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// Target platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Instant the publish should fire.
    #[must_use]
    pub const fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    /// Destination id copied from the tenant profile at creation.
    #[must_use]
    pub fn frozen_destination_id(&self) -> &str {
        &self.frozen_destination_id
    }

    /// Provider job id once dispatched.
    #[must_use]
    pub fn provider_job_id(&self) -> Option<&str> {
        self.provider_job_id.as_deref()
    }

    /// Public URL of the published post, when the provider returned one.
    #[must_use]
    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ScheduleStatus {
        self.status
    }

    /// Failure detail.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Creation instant.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation instant.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record a successful publish.
    pub fn mark_published(
        &mut self,
        provider_job_id: Option<String>,
        result_url: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = ScheduleStatus::Published;
        if provider_job_id.is_some() {
            self.provider_job_id = provider_job_id;
        }
        self.result_url = result_url;
        self.error_message = None;
        self.updated_at = at;
    }

    /// Record a terminal failure.
    pub fn mark_failed(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.status = ScheduleStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = at;
    }

    /// Note a failed attempt that will be retried; status stays `Queued`.
    pub fn note_retry(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.error_message = Some(message.into());
        self.updated_at = at;
    }

    /// Cancel before firing.
    pub fn mark_cancelled(&mut self, at: DateTime<Utc>) {
        self.status = ScheduleStatus::Cancelled;
        self.updated_at = at;
    }
}

/// Content status implied by the schedule rows of one content item.
///
/// `Approved` when there are rows and all of them are cancelled, `Published`
/// when every non-cancelled row is published, `None` while anything is still
/// queued or failed.
pub fn rolled_up_content_status(items: &[ScheduleItem]) -> Option<ContentStatus> {
    if items.is_empty() {
        return None;
    }
    let mut live = items
        .iter()
        .filter(|i| i.status() != ScheduleStatus::Cancelled)
        .peekable();
    if live.peek().is_none() {
        return Some(ContentStatus::Approved);
    }
    live.all(|i| i.status() == ScheduleStatus::Published)
        .then_some(ContentStatus::Published)
}
