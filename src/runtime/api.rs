//! API-facing request/response models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::dispatcher::DispatcherStats;
use crate::core::distributor::ScheduleOutcome;
use crate::core::SchedulerError;
use crate::runtime::engine::SchedulingEngine;
use crate::util::serde::{ContentId, TenantId};

/// Schedule request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Tenant identifier.
    pub tenant_id: TenantId,
    /// Content items to schedule.
    pub content_ids: Vec<ContentId>,
    /// First day to consider, in the tenant's timezone.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// Error payload carrying the reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code.
    pub code: String,
    /// Human-readable reason.
    pub reason: String,
    /// Whether the caller can fix it (precondition) or should retry later.
    pub precondition: bool,
}

impl From<&SchedulerError> for ErrorResponse {
    fn from(err: &SchedulerError) -> Self {
        Self {
            code: err.code().to_owned(),
            reason: err.to_string(),
            precondition: err.is_precondition(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Jobs waiting for their slot or a retry.
    pub pending_jobs: usize,
    /// Jobs currently executing.
    pub in_flight: usize,
    /// Worker threads.
    pub workers: usize,
    /// Executions that completed.
    pub completed: u64,
    /// Executions that failed or asked for a retry.
    pub failed: u64,
}

impl Health {
    /// Build a health payload from dispatcher counters.
    #[must_use]
    pub fn from_stats(stats: &DispatcherStats) -> Self {
        Self {
            ok: stats.pool.worker_count > 0,
            pending_jobs: stats.pending,
            in_flight: stats.in_flight,
            workers: stats.pool.worker_count,
            completed: stats.pool.completed_tasks,
            failed: stats.pool.failed_tasks,
        }
    }
}

/// Run a schedule request against the engine.
///
/// # Errors
///
/// The failure as an [`ErrorResponse`].
pub fn submit_schedule(
    engine: &SchedulingEngine,
    req: &ScheduleRequest,
) -> Result<ScheduleOutcome, ErrorResponse> {
    engine
        .schedule_content(&req.tenant_id, &req.content_ids, req.start_date)
        .map_err(|e| ErrorResponse::from(&e))
}
