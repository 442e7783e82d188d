//! Core scheduling abstractions, algorithms and the publish pipeline.

pub mod audit;
pub mod dispatcher;
pub mod distributor;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod provider;
pub mod publisher;
pub mod quota;
pub mod registry;
pub mod slots;
pub mod store;
pub mod worker_pool;

pub use audit::{
    build_audit_event, emit, AuditEvent, AuditSeverity, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use dispatcher::{Dispatcher, DispatcherStats, JobDispatcher};
pub use distributor::{Distributor, ScheduleOutcome, SkippedContent, SkippedPairing};
pub use error::{AppResult, SchedulerError};
pub use executor::{JobContext, JobExecutor, JobOutcome, TaskPayload};
pub use jobs::{DelayedJob, JobStore};
pub use provider::{
    PlatformResult, PostingProvider, ProviderError, ProviderIssue, ProviderResponse,
    PublishRequest,
};
pub use publisher::{CallbackStatus, ProviderCallback, PublishFailure, PublishJob, PublishWorker};
pub use quota::{Eligibility, QuotaLedger};
pub use registry::DestinationRegistry;
pub use slots::{end_of_month, generate_slots, generate_slots_at, weekday_ordinal};
pub use store::{
    BillingSource, CommittedBatch, ContentStore, DestinationStore, RuleStore, ScheduleBatch,
    ScheduleStore, UsageStore,
};
pub use worker_pool::{PoolError, PoolStats, WorkerPool};
