//! Distributor: pairs approved content with generated slots and hands the
//! committed schedule to the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::audit::{build_audit_event, emit, AuditSeverity, AuditSink};
use crate::core::dispatcher::JobDispatcher;
use crate::core::publisher::PublishJob;
use crate::core::quota::QuotaLedger;
use crate::core::registry::DestinationRegistry;
use crate::core::slots::{end_of_month, generate_slots_at};
use crate::core::store::{ContentStore, RuleStore, ScheduleBatch, ScheduleStore};
use crate::core::SchedulerError;
use crate::model::{
    rolled_up_content_status, ContentItem, ContentStatus, QuotaAction, ScheduleItem, ScheduleStatus,
};
use crate::util::clock::Clock;
use crate::util::serde::{ContentId, JobKey, Platform, ScheduleItemId, TenantId};

/// A requested content item that was left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedContent {
    /// Requested id.
    pub content_id: ContentId,
    /// Why it was skipped.
    pub reason: String,
}

/// A content/platform pair without a destination id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPairing {
    /// Content item.
    pub content_id: ContentId,
    /// Platform missing from the destination profile.
    pub platform: Platform,
}

/// Result of [`Distributor::schedule_content`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleOutcome {
    /// Number of schedule items created.
    pub scheduled_count: usize,
    /// The created schedule items, earliest first.
    pub records: Vec<ScheduleItem>,
    /// Pairings left without a slot.
    pub shortfall: usize,
    /// Requested content items that were not eligible.
    pub skipped_content: Vec<SkippedContent>,
    /// Pairings skipped for lack of a destination id.
    pub skipped_pairings: Vec<SkippedPairing>,
}

/// Converts approved content into schedule items and publish jobs.
pub struct Distributor {
    content: Arc<dyn ContentStore>,
    rules: Arc<dyn RuleStore>,
    schedules: Arc<dyn ScheduleStore>,
    registry: DestinationRegistry,
    quota: Arc<QuotaLedger>,
    dispatcher: Arc<dyn JobDispatcher<PublishJob>>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    // serializes schedule/cancel so two requests never interleave their commits
    lock: Mutex<()>,
}

impl Distributor {
    /// Assemble a distributor from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: Arc<dyn ContentStore>,
        rules: Arc<dyn RuleStore>,
        schedules: Arc<dyn ScheduleStore>,
        registry: DestinationRegistry,
        quota: Arc<QuotaLedger>,
        dispatcher: Arc<dyn JobDispatcher<PublishJob>>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            rules,
            schedules,
            registry,
            quota,
            dispatcher,
            audit,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Schedule `content_ids` for `tenant` from `start_date` (default: today
    /// in the rule's timezone) through the end of that month.
    ///
    /// Preconditions are checked in order and the first failure wins:
    /// verified destination profile, posting rule, at least one schedulable
    /// content item, auto-post eligibility.
    ///
    /// # Errors
    ///
    /// The precondition variants of [`SchedulerError`], or a backend error
    /// from the commit. Nothing is enqueued unless the commit succeeded.
    pub fn schedule_content(
        &self,
        tenant: &TenantId,
        content_ids: &[ContentId],
        start_date: Option<NaiveDate>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let _guard = self.lock.lock();

        let profile = self.registry.verified_profile(tenant)?;
        let rule = self
            .rules
            .posting_rule(tenant)?
            .ok_or_else(|| SchedulerError::PostingRuleMissing(tenant.clone()))?;
        rule.validate()?;

        let mut outcome = ScheduleOutcome::default();
        let eligible = self.eligible_content(tenant, content_ids, &mut outcome.skipped_content)?;
        if eligible.is_empty() {
            return Err(SchedulerError::NoEligibleContent);
        }
        for skipped in &outcome.skipped_content {
            warn!(
                tenant = %tenant,
                content_id = %skipped.content_id,
                reason = %skipped.reason,
                "content skipped"
            );
        }

        self.quota.require(tenant, QuotaAction::AutoPost)?;

        let now = self.clock.now();
        let start = start_date.unwrap_or_else(|| now.with_timezone(&rule.timezone).date_naive());
        let end = end_of_month(start);
        let mut slots = generate_slots_at(&rule, start, end, rule.timezone, now)?.into_iter();

        let mut items = Vec::new();
        let mut batch_content = Vec::new();
        for content in &eligible {
            // published rows survive re-scheduling and keep their platform
            let mut seen: HashSet<Platform> = self
                .schedules
                .items_for_content(&content.id)?
                .iter()
                .filter(|s| s.status() == ScheduleStatus::Published)
                .map(ScheduleItem::platform)
                .collect();
            for platform in &seen {
                debug!(
                    content_id = %content.id,
                    platform = %platform,
                    "platform already published, not re-paired"
                );
            }
            let mut paired = false;
            for &platform in &content.platforms {
                if !seen.insert(platform) {
                    continue;
                }
                let Some(destination) = DestinationRegistry::resolve(&profile, platform) else {
                    warn!(
                        tenant = %tenant,
                        content_id = %content.id,
                        platform = %platform,
                        "no destination id for platform, pairing skipped"
                    );
                    outcome.skipped_pairings.push(SkippedPairing {
                        content_id: content.id.clone(),
                        platform,
                    });
                    continue;
                };
                match slots.next() {
                    Some(slot) => {
                        items.push(ScheduleItem::new(
                            tenant.clone(),
                            content.id.clone(),
                            platform,
                            slot,
                            destination,
                            now,
                        ));
                        paired = true;
                    }
                    None => outcome.shortfall += 1,
                }
            }
            if paired {
                batch_content.push(content.id.clone());
            }
        }

        if outcome.shortfall > 0 {
            warn!(
                tenant = %tenant,
                shortfall = outcome.shortfall,
                %start,
                %end,
                "not enough slots for every pairing"
            );
        }
        if items.is_empty() {
            info!(tenant = %tenant, "nothing to schedule");
            return Ok(outcome);
        }

        let committed = self.schedules.commit_schedule(ScheduleBatch {
            content_ids: batch_content,
            items,
        })?;

        for id in &committed.superseded {
            let key = JobKey::for_schedule_item(*id);
            if let Err(e) = self.dispatcher.cancel(&key) {
                warn!(job = %key, error = %e, "could not cancel superseded job");
            }
            self.audit(tenant, "schedule.superseded", *id, AuditSeverity::Info, json!({}));
        }
        for item in &committed.inserted {
            let key = JobKey::for_schedule_item(item.id());
            let job = PublishJob {
                schedule_item_id: item.id(),
                tenant_id: tenant.clone(),
            };
            if let Err(e) = self.dispatcher.enqueue(key.clone(), job, item.scheduled_for()) {
                // the row is durable; reconcile() re-arms it
                warn!(job = %key, error = %e, "enqueue failed after commit");
            }
            self.audit(
                tenant,
                "schedule.created",
                item.id(),
                AuditSeverity::Info,
                json!({
                    "content_id": item.content_id(),
                    "platform": item.platform(),
                    "scheduled_for": item.scheduled_for(),
                    "frozen_destination_id": item.frozen_destination_id(),
                }),
            );
        }

        outcome.scheduled_count = committed.inserted.len();
        outcome.records = committed.inserted;
        info!(
            tenant = %tenant,
            scheduled = outcome.scheduled_count,
            superseded = committed.superseded.len(),
            shortfall = outcome.shortfall,
            "content scheduled"
        );
        Ok(outcome)
    }

    /// Cancel a queued schedule item and remove its pending job.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] for unknown ids and
    /// [`SchedulerError::InvalidState`] when the item is settled or its job is
    /// executing.
    pub fn cancel_schedule(&self, id: ScheduleItemId) -> Result<ScheduleItem, SchedulerError> {
        let _guard = self.lock.lock();

        let mut item = self
            .schedules
            .schedule_item(id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("schedule item {id}")))?;
        if item.status() != ScheduleStatus::Queued {
            return Err(SchedulerError::InvalidState(format!(
                "schedule item {id} is {:?}",
                item.status()
            )));
        }
        let key = JobKey::for_schedule_item(id);
        if self.dispatcher.is_running(&key) {
            return Err(SchedulerError::InvalidState(format!(
                "schedule item {id} is being published"
            )));
        }

        self.dispatcher.cancel(&key)?;
        item.mark_cancelled(self.clock.now());
        self.schedules.save_schedule_item(&item)?;

        let siblings = self.schedules.items_for_content(item.content_id())?;
        match rolled_up_content_status(&siblings) {
            Some(ContentStatus::Approved) => {
                self.content
                    .set_content_status(item.content_id(), ContentStatus::Approved)?;
                info!(content_id = %item.content_id(), "all schedules cancelled, content approved again");
            }
            Some(ContentStatus::Published) => {
                self.content
                    .set_content_status(item.content_id(), ContentStatus::Published)?;
                info!(content_id = %item.content_id(), "remaining platforms published, content published");
            }
            _ => {}
        }

        info!(schedule_item = %id, tenant = %item.tenant_id(), "schedule cancelled");
        self.audit(
            item.tenant_id(),
            "schedule.cancelled",
            id,
            AuditSeverity::Info,
            json!({ "content_id": item.content_id(), "platform": item.platform() }),
        );
        Ok(item)
    }

    fn eligible_content(
        &self,
        tenant: &TenantId,
        content_ids: &[ContentId],
        skipped: &mut Vec<SkippedContent>,
    ) -> Result<Vec<ContentItem>, SchedulerError> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::new();
        for id in content_ids {
            if !seen.insert(id) {
                continue;
            }
            let reason = match self.content.content(id)? {
                None => "content item not found".to_owned(),
                Some(item) if &item.tenant_id != tenant => {
                    "content item belongs to another tenant".to_owned()
                }
                Some(item) if !item.is_schedulable() => {
                    format!("content item is {:?}, not approved", item.status)
                }
                Some(item) => {
                    eligible.push(item);
                    continue;
                }
            };
            skipped.push(SkippedContent {
                content_id: id.clone(),
                reason,
            });
        }
        Ok(eligible)
    }

    fn audit(
        &self,
        tenant: &TenantId,
        event_type: &str,
        id: ScheduleItemId,
        severity: AuditSeverity,
        metadata: serde_json::Value,
    ) {
        emit(
            self.audit.as_ref(),
            build_audit_event(
                tenant.clone(),
                event_type,
                "schedule_item",
                id.to_string(),
                severity,
                metadata,
            ),
        );
    }
}
