//! Caller-facing engine: the distributor, the dispatcher and the publish
//! worker wired over one set of stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::core::dispatcher::{Dispatcher, DispatcherStats, JobDispatcher};
use crate::core::distributor::{Distributor, ScheduleOutcome};
use crate::core::jobs::JobStore;
use crate::core::publisher::{ProviderCallback, PublishJob, PublishWorker};
use crate::core::quota::{Eligibility, QuotaLedger};
use crate::core::store::ScheduleStore;
use crate::core::SchedulerError;
use crate::model::{QuotaAction, ScheduleItem, ScheduleStatus};
use crate::runtime::api::Health;
use crate::util::clock::Clock;
use crate::util::serde::{ContentId, JobKey, ScheduleItemId, TenantId};

/// Dispatcher type the engine runs publish jobs on.
pub type PublishDispatcher = Dispatcher<PublishJob, Box<dyn JobStore<PublishJob>>, PublishWorker>;

/// Scheduling and publishing engine. Build it with
/// [`EngineBuilder`](crate::builders::EngineBuilder).
pub struct SchedulingEngine {
    distributor: Distributor,
    worker: PublishWorker,
    dispatcher: Arc<PublishDispatcher>,
    schedules: Arc<dyn ScheduleStore>,
    quota: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
}

impl SchedulingEngine {
    pub(crate) fn new(
        distributor: Distributor,
        worker: PublishWorker,
        dispatcher: Arc<PublishDispatcher>,
        schedules: Arc<dyn ScheduleStore>,
        quota: Arc<QuotaLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            distributor,
            worker,
            dispatcher,
            schedules,
            quota,
            clock,
        }
    }

    /// Schedule approved content for a tenant. See
    /// [`Distributor::schedule_content`].
    ///
    /// # Errors
    ///
    /// Precondition failures and storage errors.
    pub fn schedule_content(
        &self,
        tenant: &TenantId,
        content_ids: &[ContentId],
        start_date: Option<NaiveDate>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        self.distributor
            .schedule_content(tenant, content_ids, start_date)
    }

    /// Cancel a queued schedule item.
    ///
    /// # Errors
    ///
    /// See [`Distributor::cancel_schedule`].
    pub fn cancel_schedule(&self, id: ScheduleItemId) -> Result<ScheduleItem, SchedulerError> {
        self.distributor.cancel_schedule(id)
    }

    /// Up to `limit` schedule items of `tenant`, earliest first: everything
    /// still queued plus settled items whose slot lies ahead. Cancelled items
    /// are left out.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn get_upcoming_schedule(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<ScheduleItem>, SchedulerError> {
        let now = self.clock.now();
        Ok(self
            .schedules
            .items_for_tenant(tenant)?
            .into_iter()
            .filter(|item| match item.status() {
                ScheduleStatus::Queued => true,
                ScheduleStatus::Cancelled => false,
                _ => item.scheduled_for() >= now,
            })
            .take(limit)
            .collect())
    }

    /// A single schedule item.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn get_schedule_item(
        &self,
        id: ScheduleItemId,
    ) -> Result<Option<ScheduleItem>, SchedulerError> {
        self.schedules.schedule_item(id)
    }

    /// Quota eligibility of `tenant` for `action`.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn check_eligibility(
        &self,
        tenant: &TenantId,
        action: QuotaAction,
    ) -> Result<Eligibility, SchedulerError> {
        self.quota.check_eligibility(tenant, action)
    }

    /// Apply an asynchronous provider status update.
    ///
    /// # Errors
    ///
    /// See [`PublishWorker::apply_callback`].
    pub fn handle_provider_callback(
        &self,
        callback: &ProviderCallback,
    ) -> Result<ScheduleItem, SchedulerError> {
        self.worker.apply_callback(callback)
    }

    /// Re-enqueue every queued schedule item that has no pending job.
    /// Returns how many jobs were re-armed.
    ///
    /// # Errors
    ///
    /// Storage errors while listing items; enqueue failures stop the sweep.
    pub fn reconcile(&self) -> Result<usize, SchedulerError> {
        let mut rearmed = 0;
        for item in self.schedules.queued_items()? {
            let key = JobKey::for_schedule_item(item.id());
            if self.dispatcher.is_pending(&key) || self.dispatcher.is_running(&key) {
                continue;
            }
            let job = PublishJob {
                schedule_item_id: item.id(),
                tenant_id: item.tenant_id().clone(),
            };
            self.dispatcher
                .enqueue(key, job, item.scheduled_for())?;
            rearmed += 1;
        }
        if rearmed > 0 {
            warn!(rearmed, "reconcile re-armed queued items without a pending job");
        } else {
            info!("reconcile found every queued item armed");
        }
        Ok(rearmed)
    }

    /// Dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Health snapshot.
    #[must_use]
    pub fn health(&self) -> Health {
        Health::from_stats(&self.stats())
    }

    /// Block until no publish job is pending or executing, or `timeout`
    /// elapses. Returns whether the engine went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Stop firing jobs. Pending jobs stay in the job store.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}
