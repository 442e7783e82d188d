//! Tests for configuration validation

use std::time::Duration;

use prometheus_publisher::config::{
    DispatcherConfig, EngineConfig, JobStoreConfig, ProviderConfig, QuotaConfig, WorkerPoolConfig,
};
use prometheus_publisher::model::{PlanTier, QuotaAction};

#[test]
fn test_engine_config_defaults_are_valid() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.dispatcher.job_store, JobStoreConfig::InMemory);
}

#[test]
fn test_worker_pool_config_invalid_queue_depth() {
    let cfg = WorkerPoolConfig::new().with_max_queue_depth(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_worker_pool_config_small_stack_rejected() {
    let cfg = WorkerPoolConfig::new().with_thread_stack_size(1024);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_dispatcher_backoff_must_not_exceed_cap() {
    let cfg = DispatcherConfig {
        backoff_base_ms: 10_000,
        max_backoff_ms: 1_000,
        ..DispatcherConfig::default()
    };
    assert_eq!(
        cfg.validate().unwrap_err(),
        "max_backoff_ms must be >= backoff_base_ms"
    );
}

#[test]
fn test_dispatcher_default_backoff_starts_at_thirty_seconds() {
    let cfg = DispatcherConfig::default();
    assert_eq!(cfg.backoff_for(1), Duration::from_secs(30));
    assert_eq!(cfg.backoff_for(2), Duration::from_secs(60));
}

#[test]
fn test_file_job_store_needs_stream() {
    let cfg = DispatcherConfig {
        job_store: JobStoreConfig::File {
            path: "/tmp/jobs".into(),
            stream: "  ".into(),
        },
        ..DispatcherConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_provider_config_requires_http_url() {
    let cfg = ProviderConfig {
        base_url: "poster.example".into(),
        ..ProviderConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = ProviderConfig {
        timeout_secs: 0,
        ..ProviderConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_quota_defaults_gate_auto_post_by_plan() {
    let cfg = QuotaConfig::default();
    assert!(!cfg.plans[&PlanTier::Starter].auto_post_included);
    assert!(cfg.plans[&PlanTier::Pro].auto_post_included);
    assert!(cfg.plans[&PlanTier::Agency].auto_post_included);
    assert_eq!(cfg.plans[&PlanTier::Starter].content_cap(QuotaAction::CreatePost), Some(60));
    assert_eq!(cfg.plans[&PlanTier::Agency].content_cap(QuotaAction::CreatePost), None);
    assert_eq!(cfg.discount_cap("FOUNDER"), Some(30));
    assert_eq!(cfg.discount_cap("partner"), None);
}

#[test]
fn test_quota_config_requires_a_plan() {
    let cfg = QuotaConfig {
        plans: Default::default(),
        discount_auto_post_caps: Vec::new(),
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_engine_config_from_json() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "workers": { "worker_count": 2 },
            "dispatcher": { "max_attempts": 4, "job_store": { "kind": "file", "path": "/var/lib/publisher", "stream": "jobs" } },
            "provider": { "base_url": "https://poster.example", "api_key": "k", "timeout_secs": 10 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.workers.worker_count, 2);
    assert_eq!(cfg.dispatcher.max_attempts, 4);
    assert_eq!(cfg.provider.api_key.as_deref(), Some("k"));
    assert!(matches!(cfg.dispatcher.job_store, JobStoreConfig::File { ref stream, .. } if stream == "jobs"));
}

#[test]
fn test_engine_config_from_json_rejects_invalid_section() {
    let err = EngineConfig::from_json_str(r#"{"dispatcher":{"max_pending":0}}"#).unwrap_err();
    assert!(err.starts_with("dispatcher invalid"), "{err}");
}
