//! Builder that assembles a [`SchedulingEngine`] from configuration.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{EngineConfig, JobStoreConfig};
use crate::core::audit::{AuditSink, TracingAuditSink};
use crate::core::dispatcher::Dispatcher;
use crate::core::distributor::Distributor;
use crate::core::jobs::JobStore;
use crate::core::provider::PostingProvider;
use crate::core::publisher::{PublishJob, PublishWorker};
use crate::core::quota::QuotaLedger;
use crate::core::registry::DestinationRegistry;
use crate::core::store::{
    BillingSource, ContentStore, DestinationStore, RuleStore, ScheduleStore, UsageStore,
};
use crate::core::{AppResult, SchedulerError};
use crate::infra::provider::HttpPostingProvider;
use crate::infra::queue::{FileJobStore, InMemoryJobStore};
use crate::runtime::SchedulingEngine;
use crate::util::clock::{Clock, SystemClock};

struct Stores {
    content: Arc<dyn ContentStore>,
    destinations: Arc<dyn DestinationStore>,
    rules: Arc<dyn RuleStore>,
    schedules: Arc<dyn ScheduleStore>,
    usage: Arc<dyn UsageStore>,
}

/// Assembles the engine's collaborators.
///
/// Stores and the billing source are required. The provider defaults to
/// [`HttpPostingProvider`] over `config.provider`, the audit sink to
/// [`TracingAuditSink`], the clock to [`SystemClock`] and the job store to
/// the backend named by `config.dispatcher.job_store`.
pub struct EngineBuilder {
    config: EngineConfig,
    stores: Option<Stores>,
    billing: Option<Arc<dyn BillingSource>>,
    provider: Option<Arc<dyn PostingProvider>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
    job_store: Option<Box<dyn JobStore<PublishJob>>>,
    reconcile_on_start: bool,
}

impl EngineBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stores: None,
            billing: None,
            provider: None,
            audit: None,
            clock: None,
            job_store: None,
            reconcile_on_start: true,
        }
    }

    /// Start from `.env` and `PUBLISHER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Invalid or unparsable configuration.
    pub fn from_env() -> AppResult<Self> {
        let config = EngineConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("loading engine configuration from the environment")?;
        Ok(Self::new(config))
    }

    /// Use one backend for every store trait.
    #[must_use]
    pub fn with_stores<S>(mut self, store: Arc<S>) -> Self
    where
        S: ContentStore + DestinationStore + RuleStore + ScheduleStore + UsageStore + 'static,
    {
        self.stores = Some(Stores {
            content: store.clone(),
            destinations: store.clone(),
            rules: store.clone(),
            schedules: store.clone(),
            usage: store,
        });
        self
    }

    /// Billing facts for the quota ledger.
    #[must_use]
    pub fn with_billing(mut self, billing: Arc<dyn BillingSource>) -> Self {
        self.billing = Some(billing);
        self
    }

    /// Posting provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PostingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Clock for scheduling decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Job store, overriding `config.dispatcher.job_store`.
    #[must_use]
    pub fn with_job_store(mut self, store: Box<dyn JobStore<PublishJob>>) -> Self {
        self.job_store = Some(store);
        self
    }

    /// Whether [`Self::build`] runs [`SchedulingEngine::reconcile`]
    /// (default `true`).
    #[must_use]
    pub fn reconcile_on_start(mut self, enabled: bool) -> Self {
        self.reconcile_on_start = enabled;
        self
    }

    /// Validate the configuration and start the engine.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for invalid configuration or missing
    /// collaborators, backend errors from the job store or thread spawning.
    pub fn build(self) -> Result<SchedulingEngine, SchedulerError> {
        self.config.validate().map_err(SchedulerError::Config)?;

        let stores = self
            .stores
            .ok_or_else(|| SchedulerError::Config("stores are required".into()))?;
        let billing = self
            .billing
            .ok_or_else(|| SchedulerError::Config("billing source is required".into()))?;
        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(
                HttpPostingProvider::new(&self.config.provider)
                    .map_err(|e| SchedulerError::Config(e.to_string()))?,
            ),
        };
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let job_store = match self.job_store {
            Some(store) => store,
            None => open_job_store(&self.config)?,
        };

        let registry = DestinationRegistry::new(stores.destinations);
        let quota = Arc::new(QuotaLedger::new(
            self.config.quota.clone(),
            stores.usage,
            billing,
        ));
        let worker = PublishWorker::new(
            stores.content.clone(),
            stores.schedules.clone(),
            registry.clone(),
            quota.clone(),
            provider,
            audit.clone(),
            clock.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::start(
            self.config.dispatcher.clone(),
            job_store,
            self.config.workers.clone(),
            worker.clone(),
            clock.clone(),
        )?);
        let distributor = Distributor::new(
            stores.content,
            stores.rules,
            stores.schedules.clone(),
            registry,
            quota.clone(),
            dispatcher.clone(),
            audit,
            clock.clone(),
        );

        let engine =
            SchedulingEngine::new(distributor, worker, dispatcher, stores.schedules, quota, clock);
        if self.reconcile_on_start {
            engine.reconcile()?;
        }
        info!(
            workers = self.config.workers.worker_count,
            max_attempts = self.config.dispatcher.max_attempts,
            "scheduling engine started"
        );
        Ok(engine)
    }
}

fn open_job_store(
    config: &EngineConfig,
) -> Result<Box<dyn JobStore<PublishJob>>, SchedulerError> {
    let max_pending = config.dispatcher.max_pending;
    let store: Box<dyn JobStore<PublishJob>> = match &config.dispatcher.job_store {
        JobStoreConfig::InMemory => Box::new(InMemoryJobStore::<PublishJob>::new(max_pending)),
        JobStoreConfig::File { path, stream } => Box::new(FileJobStore::<PublishJob>::open(
            path,
            stream.clone(),
            max_pending,
        )?),
    };
    Ok(store)
}
