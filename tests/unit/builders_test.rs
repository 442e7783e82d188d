//! Tests for builder modules

use std::sync::Arc;

use prometheus_publisher::builders::EngineBuilder;
use prometheus_publisher::config::EngineConfig;
use prometheus_publisher::core::{PublishJob, SchedulerError};
use prometheus_publisher::infra::{InMemoryJobStore, InMemoryStore, RecordingProvider};

#[test]
fn test_builder_requires_billing() {
    let err = EngineBuilder::new(EngineConfig::default())
        .with_stores(Arc::new(InMemoryStore::new()))
        .with_provider(Arc::new(RecordingProvider::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::Config(ref msg) if msg.contains("billing")));
}

#[test]
fn test_builder_accepts_explicit_job_store() {
    use prometheus_publisher::infra::StaticBillingSource;

    let mut config = EngineConfig::default();
    config.workers.worker_count = 1;
    let engine = EngineBuilder::new(config)
        .with_stores(Arc::new(InMemoryStore::new()))
        .with_billing(Arc::new(StaticBillingSource::new()))
        .with_provider(Arc::new(RecordingProvider::new()))
        .with_job_store(Box::new(InMemoryJobStore::<PublishJob>::new(16)))
        .reconcile_on_start(false)
        .build()
        .unwrap();
    let health = engine.health();
    assert!(health.ok);
    assert_eq!(health.workers, 1);
    engine.shutdown();
}
