//! Publish worker: runs fired publish jobs under the destination-safety
//! protocol.
//!
//! Every execution re-reads the schedule item, its content and the tenant's
//! current destination profile. The provider only ever receives the
//! item's frozen destination id, and only after the live profile has been
//! shown to still resolve to that same id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::core::audit::{build_audit_event, emit, AuditSeverity, AuditSink};
use crate::core::executor::{JobContext, JobExecutor, JobOutcome};
use crate::core::provider::{PostingProvider, ProviderResponse, PublishRequest};
use crate::core::quota::QuotaLedger;
use crate::core::registry::DestinationRegistry;
use crate::core::store::{ContentStore, ScheduleStore};
use crate::core::SchedulerError;
use crate::model::{
    rolled_up_content_status, ContentItem, ContentStatus, QuotaAction, ScheduleItem, ScheduleStatus,
};
use crate::util::clock::Clock;
use crate::util::serde::{ContentId, Platform, ScheduleItemId, TenantId};

/// Dispatcher payload of a publish job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    /// Schedule item to publish.
    pub schedule_item_id: ScheduleItemId,
    /// Tenant the item was scheduled for.
    pub tenant_id: TenantId,
}

/// Terminal reasons a publish did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishFailure {
    /// The live destination no longer matches the frozen one.
    #[error("destination for {platform} changed since scheduling")]
    DestinationChanged {
        /// Platform of the schedule item.
        platform: Platform,
    },
    /// Tenant ids of the job, schedule item and content disagree.
    #[error("schedule item belongs to tenant {expected} but found tenant {found}")]
    OwnershipMismatch {
        /// Tenant of the schedule item.
        expected: TenantId,
        /// Conflicting tenant.
        found: TenantId,
    },
    /// The tenant's destination profile needs a reconnect.
    #[error("destination profile of tenant {0} is not verified")]
    DestinationNotVerified(TenantId),
    /// The content item was deleted.
    #[error("content item {0} no longer exists")]
    ContentMissing(ContentId),
    /// Auto-posting is no longer allowed.
    #[error("{0}")]
    QuotaExceeded(String),
    /// The provider refused the post or failed permanently.
    #[error("{0}")]
    Provider(String),
}

impl PublishFailure {
    /// Stable code, used as the `error_message` prefix.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DestinationChanged { .. } => "DestinationChanged",
            Self::OwnershipMismatch { .. } => "OwnershipMismatch",
            Self::DestinationNotVerified(_) => "DestinationNotVerified",
            Self::ContentMissing(_) => "ContentMissing",
            Self::QuotaExceeded(_) => "QuotaExceeded",
            Self::Provider(_) => "Provider",
        }
    }

    /// Whether the failure is a security violation.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::DestinationChanged { .. } | Self::OwnershipMismatch { .. }
        )
    }

    /// Text stored in `ScheduleItem::error_message`.
    #[must_use]
    pub fn error_message(&self) -> String {
        format!("{}: {self}", self.code())
    }

    fn audit_event_type(&self) -> &'static str {
        match self {
            Self::DestinationChanged { .. } => "security.destination_changed",
            Self::OwnershipMismatch { .. } => "security.ownership_mismatch",
            _ => "publish.failed",
        }
    }
}

/// Final status reported by a provider callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// The post went live.
    Published,
    /// The provider gave up on the post.
    Failed,
}

/// Asynchronous status update from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCallback {
    /// Job id returned by the provider at publish time.
    pub provider_job_id: String,
    /// Reported status.
    pub status: CallbackStatus,
    /// Public URL of the post.
    #[serde(default)]
    pub post_url: Option<String>,
    /// Provider error detail.
    #[serde(default)]
    pub error: Option<String>,
}

/// Executes [`PublishJob`]s.
#[derive(Clone)]
pub struct PublishWorker {
    content: Arc<dyn ContentStore>,
    schedules: Arc<dyn ScheduleStore>,
    registry: DestinationRegistry,
    quota: Arc<QuotaLedger>,
    provider: Arc<dyn PostingProvider>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl PublishWorker {
    /// Assemble a worker from its collaborators.
    pub fn new(
        content: Arc<dyn ContentStore>,
        schedules: Arc<dyn ScheduleStore>,
        registry: DestinationRegistry,
        quota: Arc<QuotaLedger>,
        provider: Arc<dyn PostingProvider>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            schedules,
            registry,
            quota,
            provider,
            audit,
            clock,
        }
    }

    /// Run the safety protocol for one fired job.
    ///
    /// # Errors
    ///
    /// Storage failures before the provider call; the caller treats them as
    /// transient.
    pub async fn publish(
        &self,
        job: &PublishJob,
        ctx: &JobContext,
    ) -> Result<JobOutcome, SchedulerError> {
        let Some(mut item) = self.schedules.schedule_item(job.schedule_item_id)? else {
            info!("schedule item no longer exists, skipping");
            return Ok(JobOutcome::Completed);
        };
        if item.status() != ScheduleStatus::Queued {
            info!(status = ?item.status(), "schedule item already settled, skipping");
            return Ok(JobOutcome::Completed);
        }

        if &job.tenant_id != item.tenant_id() {
            let failure = PublishFailure::OwnershipMismatch {
                expected: item.tenant_id().clone(),
                found: job.tenant_id.clone(),
            };
            return self.fail(item, &failure, json!({ "source": "job" }));
        }

        let Some(content) = self.content.content(item.content_id())? else {
            let failure = PublishFailure::ContentMissing(item.content_id().clone());
            return self.fail(item, &failure, json!({}));
        };
        if &content.tenant_id != item.tenant_id() {
            let failure = PublishFailure::OwnershipMismatch {
                expected: item.tenant_id().clone(),
                found: content.tenant_id.clone(),
            };
            return self.fail(item, &failure, json!({ "source": "content" }));
        }

        let profile = self.registry.current_profile(item.tenant_id())?;
        let live = profile
            .as_ref()
            .and_then(|p| DestinationRegistry::resolve(p, item.platform()));
        if live.as_deref() != Some(item.frozen_destination_id()) {
            let failure = PublishFailure::DestinationChanged {
                platform: item.platform(),
            };
            let metadata = json!({
                "frozen_destination_id": item.frozen_destination_id(),
                "current_destination_id": live,
            });
            return self.fail(item, &failure, metadata);
        }
        if !profile.as_ref().is_some_and(|p| p.is_verified()) {
            let failure = PublishFailure::DestinationNotVerified(item.tenant_id().clone());
            return self.fail(item, &failure, json!({}));
        }

        let eligibility = self
            .quota
            .check_eligibility(item.tenant_id(), QuotaAction::AutoPost)?;
        if !eligibility.allowed {
            let failure = PublishFailure::QuotaExceeded(
                eligibility
                    .reason
                    .unwrap_or_else(|| "auto-post quota exhausted".into()),
            );
            return self.fail(
                item,
                &failure,
                json!({ "used": eligibility.used, "limit": eligibility.limit }),
            );
        }

        let request = PublishRequest {
            destination_id: item.frozen_destination_id().to_owned(),
            platform: item.platform(),
            text: content.post_text(),
            media_urls: content.media_urls.clone(),
            idempotency_key: item.id().to_string(),
        };
        match self.provider.publish(request).await {
            Ok(response) if response.success => Ok(self.succeed(item, &content, &response)),
            Ok(response) => {
                let failure = PublishFailure::Provider(format!(
                    "provider rejected post: {}",
                    response.error_summary()
                ));
                self.fail(
                    item,
                    &failure,
                    json!({ "provider_job_id": response.provider_job_id }),
                )
            }
            Err(e) if e.is_retryable() && !ctx.is_final_attempt() => {
                let message = format!(
                    "Provider: {e} (attempt {}/{})",
                    ctx.attempt, ctx.max_attempts
                );
                warn!(error = %e, "transient provider failure");
                item.note_retry(message, self.clock.now());
                self.save(&item)?;
                Ok(JobOutcome::Retry(e.to_string()))
            }
            Err(e) => {
                let failure = PublishFailure::Provider(e.to_string());
                self.fail(item, &failure, json!({ "attempt": ctx.attempt }))
            }
        }
    }

    /// Apply an asynchronous provider status update.
    ///
    /// Re-delivery of an already applied status is a no-op.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] for an unknown provider job id and
    /// [`SchedulerError::InvalidState`] for cancelled items.
    pub fn apply_callback(
        &self,
        callback: &ProviderCallback,
    ) -> Result<ScheduleItem, SchedulerError> {
        let mut item = self
            .schedules
            .item_by_provider_job(&callback.provider_job_id)?
            .ok_or_else(|| {
                SchedulerError::NotFound(format!(
                    "schedule item for provider job {}",
                    callback.provider_job_id
                ))
            })?;
        if item.status() == ScheduleStatus::Cancelled {
            return Err(SchedulerError::InvalidState(format!(
                "schedule item {} is cancelled",
                item.id()
            )));
        }

        let now = self.clock.now();
        match callback.status {
            CallbackStatus::Published => {
                let was_published = item.status() == ScheduleStatus::Published;
                if was_published
                    && callback.post_url.as_deref().map_or(true, |url| Some(url) == item.result_url())
                {
                    return Ok(item);
                }
                let url = callback
                    .post_url
                    .clone()
                    .or_else(|| item.result_url().map(str::to_owned));
                item.mark_published(None, url, now);
                self.schedules.save_schedule_item(&item)?;
                if !was_published {
                    self.roll_up_content(item.content_id())?;
                    self.audit(&item, "publish.succeeded", AuditSeverity::Info, json!({
                        "source": "callback",
                        "provider_job_id": callback.provider_job_id,
                    }));
                }
            }
            CallbackStatus::Failed if item.status() == ScheduleStatus::Failed => {
                return Ok(item);
            }
            CallbackStatus::Failed => {
                let failure = PublishFailure::Provider(
                    callback
                        .error
                        .clone()
                        .unwrap_or_else(|| "provider reported failure".into()),
                );
                item.mark_failed(failure.error_message(), now);
                self.schedules.save_schedule_item(&item)?;
                self.audit(&item, "publish.failed", AuditSeverity::Warning, json!({
                    "source": "callback",
                    "provider_job_id": callback.provider_job_id,
                    "error": item.error_message(),
                }));
            }
        }
        info!(
            schedule_item = %item.id(),
            status = ?item.status(),
            "provider callback applied"
        );
        Ok(item)
    }

    /// After a provider success nothing may turn into a retry, or the post
    /// would go out twice; storage errors are logged instead.
    fn succeed(
        &self,
        mut item: ScheduleItem,
        content: &ContentItem,
        response: &ProviderResponse,
    ) -> JobOutcome {
        item.mark_published(
            response.provider_job_id.clone(),
            response.post_url(),
            self.clock.now(),
        );
        match self.save(&item) {
            Ok(true) => {}
            Ok(false) => warn!("published, but the schedule item was superseded meanwhile"),
            Err(e) => error!(error = %e, "published, but the schedule item could not be saved"),
        }
        if let Err(e) = self.roll_up_content(&content.id) {
            error!(error = %e, content_id = %content.id, "content roll-up failed");
        }
        if let Err(e) = self.quota.increment(item.tenant_id(), QuotaAction::AutoPost) {
            warn!(error = %e, tenant = %item.tenant_id(), "auto-post usage not recorded");
        }
        info!(
            tenant = %item.tenant_id(),
            platform = %item.platform(),
            provider_job_id = ?item.provider_job_id(),
            "published"
        );
        self.audit(&item, "publish.succeeded", AuditSeverity::Info, json!({
            "provider_job_id": item.provider_job_id(),
            "result_url": item.result_url(),
        }));
        JobOutcome::Completed
    }

    fn fail(
        &self,
        mut item: ScheduleItem,
        failure: &PublishFailure,
        mut metadata: serde_json::Value,
    ) -> Result<JobOutcome, SchedulerError> {
        let message = failure.error_message();
        item.mark_failed(message.clone(), self.clock.now());
        if !self.save(&item)? {
            warn!("schedule item superseded during execution, dropping failure");
            return Ok(JobOutcome::Completed);
        }

        let severity = if failure.is_security_violation() {
            error!(
                tenant = %item.tenant_id(),
                platform = %item.platform(),
                code = failure.code(),
                "publish blocked by security check"
            );
            AuditSeverity::Critical
        } else {
            warn!(
                tenant = %item.tenant_id(),
                platform = %item.platform(),
                code = failure.code(),
                error = %failure,
                "publish failed"
            );
            AuditSeverity::Warning
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("code".into(), json!(failure.code()));
            map.insert("error".into(), json!(message));
        }
        self.audit(&item, failure.audit_event_type(), severity, metadata);
        Ok(JobOutcome::Failed(message))
    }

    /// Save, reporting `false` when the row was deleted by a re-schedule.
    fn save(&self, item: &ScheduleItem) -> Result<bool, SchedulerError> {
        match self.schedules.save_schedule_item(item) {
            Ok(()) => Ok(true),
            Err(SchedulerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn roll_up_content(&self, content_id: &ContentId) -> Result<(), SchedulerError> {
        let items = self.schedules.items_for_content(content_id)?;
        if rolled_up_content_status(&items) == Some(ContentStatus::Published) {
            self.content
                .set_content_status(content_id, ContentStatus::Published)?;
            info!(content_id = %content_id, "every platform published, content published");
        }
        Ok(())
    }

    fn audit(
        &self,
        item: &ScheduleItem,
        event_type: &str,
        severity: AuditSeverity,
        mut metadata: serde_json::Value,
    ) {
        if let Some(map) = metadata.as_object_mut() {
            map.insert("platform".into(), json!(item.platform()));
            map.insert("content_id".into(), json!(item.content_id()));
        }
        emit(
            self.audit.as_ref(),
            build_audit_event(
                item.tenant_id().clone(),
                event_type,
                "schedule_item",
                item.id().to_string(),
                severity,
                metadata,
            ),
        );
    }

    fn fail_after_storage_errors(&self, job: &PublishJob, cause: &SchedulerError) {
        let mut item = match self.schedules.schedule_item(job.schedule_item_id) {
            Ok(Some(item)) if item.status() == ScheduleStatus::Queued => item,
            _ => return,
        };
        let message = format!("{}: {cause}", cause.code());
        item.mark_failed(message.clone(), self.clock.now());
        if self.save(&item).unwrap_or(false) {
            self.audit(&item, "publish.failed", AuditSeverity::Warning, json!({
                "code": cause.code(),
                "error": message,
            }));
        }
    }
}

#[async_trait]
impl JobExecutor<PublishJob> for PublishWorker {
    async fn execute(&self, job: PublishJob, ctx: JobContext) -> JobOutcome {
        let span = info_span!(
            "publish",
            schedule_item = %job.schedule_item_id,
            attempt = ctx.attempt
        );
        match self.publish(&job, &ctx).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    schedule_item = %job.schedule_item_id,
                    attempt = ctx.attempt,
                    error = %e,
                    "publish attempt hit a storage error"
                );
                if ctx.is_final_attempt() {
                    self.fail_after_storage_errors(&job, &e);
                }
                JobOutcome::Retry(e.to_string())
            }
        }
    }
}
