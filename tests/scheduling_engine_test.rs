//! End-to-end tests for the scheduling engine.
//!
//! These tests drive the real dispatcher, worker pool and publish worker
//! against a manual clock shared by every component:
//! - Distribution with a slot shortfall, published through the pool
//! - Destination changes between scheduling and firing
//! - Re-scheduling superseding pending jobs across a restart
//! - Quota caps, retries, callbacks, cancellation and reconciliation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus_publisher::builders::EngineBuilder;
use prometheus_publisher::config::{EngineConfig, JobStoreConfig};
use prometheus_publisher::core::{
    AuditSeverity, CallbackStatus, ContentStore, InMemoryAuditSink, ProviderCallback,
    ProviderError, ScheduleBatch, ScheduleStore, SchedulerError,
};
use prometheus_publisher::infra::{InMemoryStore, RecordingProvider, StaticBillingSource};
use prometheus_publisher::model::{
    BillingSnapshot, ContentItem, ContentStatus, DestinationProfile, PlanTier, PostingRule,
    QuotaAction, ScheduleItem, ScheduleStatus, TimeWindow,
};
use prometheus_publisher::runtime::{submit_schedule, ScheduleRequest, SchedulingEngine};
use prometheus_publisher::util::{ManualClock, Platform};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// A Tuesday: Monday slots 11, 18 and 25 stay pending until the clock moves.
const NOW: &str = "2030-03-05T00:00:00Z";

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

struct Harness {
    store: Arc<InMemoryStore>,
    billing: Arc<StaticBillingSource>,
    provider: Arc<RecordingProvider>,
    audit: Arc<InMemoryAuditSink>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(plan: PlanTier) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let billing = Arc::new(StaticBillingSource::new());
        billing.set(
            "t1".into(),
            BillingSnapshot {
                plan,
                period_start: utc("2024-01-01T00:00:00Z"),
                period_end: utc("2040-01-01T00:00:00Z"),
                auto_post_addon: false,
                discount_tier: None,
            },
        );
        store.put_destination_profile(DestinationProfile::verified(
            "t1",
            [
                (Platform::Facebook, "fb-1".to_owned()),
                (Platform::Instagram, "ig-1".to_owned()),
            ],
            utc("2024-01-01T00:00:00Z"),
        ));
        store
            .put_posting_rule(PostingRule::new("t1", [1], TimeWindow::Morning))
            .unwrap();
        Self {
            store,
            billing,
            provider: Arc::new(RecordingProvider::new()),
            audit: Arc::new(InMemoryAuditSink::new(1_000)),
            clock: Arc::new(ManualClock::new(utc(NOW))),
        }
    }

    fn add_content(&self, id: &str, platforms: &[Platform]) {
        self.store.put_content(ContentItem {
            id: id.into(),
            tenant_id: "t1".into(),
            status: ContentStatus::Approved,
            platforms: platforms.to_vec(),
            caption: format!("caption {id}"),
            hashtags: vec!["local".into()],
            media_urls: Vec::new(),
        });
    }

    fn builder(&self, config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
            .with_stores(self.store.clone())
            .with_billing(self.billing.clone())
            .with_provider(self.provider.clone())
            .with_audit_sink(self.audit.clone())
            .with_clock(self.clock.clone())
    }

    fn engine(&self) -> SchedulingEngine {
        self.builder(fast_config()).build().unwrap()
    }

    /// Advance the clock a day at a time until every job has settled,
    /// retries included.
    fn drive(&self, engine: &SchedulingEngine) {
        for _ in 0..400 {
            if engine.wait_idle(Duration::from_millis(20)) {
                return;
            }
            self.clock.advance(chrono::Duration::days(1));
        }
        panic!("engine did not go idle");
    }

    fn item(&self, item: &ScheduleItem) -> ScheduleItem {
        self.store.schedule_item(item.id()).unwrap().unwrap()
    }

    fn content_status(&self, id: &str) -> ContentStatus {
        self.store.content(&id.into()).unwrap().unwrap().status
    }
}

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.workers.worker_count = 2;
    config.dispatcher.backoff_base_ms = 10;
    config.dispatcher.max_backoff_ms = 40;
    config.dispatcher.max_timer_sleep_ms = 5;
    config
}

fn file_config(dir: &Path) -> EngineConfig {
    let mut config = fast_config();
    config.dispatcher.job_store = JobStoreConfig::File {
        path: dir.to_path_buf(),
        stream: "publish".into(),
    };
    config
}

// ============================================================================
// DISTRIBUTION AND PUBLISHING
// ============================================================================

#[test]
fn two_items_two_platforms_three_slots() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook, Platform::Instagram]);
    h.add_content("c2", &[Platform::Facebook, Platform::Instagram]);
    let engine = h.engine();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into(), "c2".into()], None)
        .unwrap();
    assert_eq!(outcome.scheduled_count, 3);
    assert_eq!(outcome.shortfall, 1);
    assert!(outcome.skipped_content.is_empty());

    h.drive(&engine);
    assert_eq!(h.provider.call_count(), 3);
    for record in &outcome.records {
        assert_eq!(h.item(record).status(), ScheduleStatus::Published);
    }
    assert_eq!(h.content_status("c1"), ContentStatus::Published);
    assert_eq!(h.audit.events_of_type("publish.succeeded").len(), 3);

    let eligibility = engine
        .check_eligibility(&"t1".into(), QuotaAction::AutoPost)
        .unwrap();
    assert_eq!(eligibility.used, 3);
    engine.shutdown();
}

#[test]
fn provider_receives_frozen_destination_and_post_text() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Instagram]);
    let engine = h.engine();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    h.drive(&engine);

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].destination_id, "ig-1");
    assert_eq!(requests[0].platform, Platform::Instagram);
    assert_eq!(requests[0].text, "caption c1\n\n#local");
    assert_eq!(requests[0].idempotency_key, outcome.records[0].id().to_string());

    let published = h.item(&outcome.records[0]);
    assert_eq!(published.provider_job_id(), Some("job-1"));
    assert_eq!(published.result_url(), Some("https://posts.example/ig-1/1"));
    engine.shutdown();
}

// ============================================================================
// DESTINATION SAFETY
// ============================================================================

#[test]
fn destination_change_fails_without_calling_provider() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);

    let engine = h.builder(file_config(dir.path())).build().unwrap();
    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    assert_eq!(engine.stats().pending, 1);
    engine.shutdown();
    drop(engine);

    // tenant reconnects a different page while the job waits
    h.store.put_destination_profile(DestinationProfile::verified(
        "t1",
        [
            (Platform::Facebook, "fb-2".to_owned()),
            (Platform::Instagram, "ig-1".to_owned()),
        ],
        utc("2030-03-06T00:00:00Z"),
    ));

    let engine = h.builder(file_config(dir.path())).build().unwrap();
    assert_eq!(engine.stats().pending, 1);
    h.drive(&engine);

    assert_eq!(h.provider.call_count(), 0);
    let failed = h.item(&outcome.records[0]);
    assert_eq!(failed.status(), ScheduleStatus::Failed);
    assert!(failed.error_message().unwrap().starts_with("DestinationChanged"));
    assert_eq!(failed.frozen_destination_id(), "fb-1");

    let events = h.audit.events_of_type("security.destination_changed");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, AuditSeverity::Critical);
    assert_eq!(h.content_status("c1"), ContentStatus::Scheduled);
    engine.shutdown();
}

#[test]
fn rescheduling_fires_only_the_latest_set() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);

    let engine = h.builder(file_config(dir.path())).build().unwrap();
    let first = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    let second = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    assert_eq!(engine.stats().pending, 1);
    assert_eq!(h.store.schedule_count(), 1);
    assert!(engine
        .get_schedule_item(first.records[0].id())
        .unwrap()
        .is_none());
    engine.shutdown();
    drop(engine);

    let engine = h.builder(file_config(dir.path())).build().unwrap();
    assert_eq!(engine.stats().pending, 1);
    h.drive(&engine);

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].idempotency_key,
        second.records[0].id().to_string()
    );
    assert_eq!(h.item(&second.records[0]).status(), ScheduleStatus::Published);
    engine.shutdown();
}

// ============================================================================
// QUOTA
// ============================================================================

#[test]
fn plan_without_auto_post_cannot_schedule() {
    let h = Harness::new(PlanTier::Starter);
    h.add_content("c1", &[Platform::Facebook]);
    let engine = h.engine();

    let err = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::QuotaExceeded(_)));
    assert!(err.is_precondition());
    assert_eq!(h.store.schedule_count(), 0);
    assert_eq!(h.content_status("c1"), ContentStatus::Approved);
    engine.shutdown();
}

#[test]
fn auto_post_cap_is_enforced_at_fire_time() {
    let h = Harness::new(PlanTier::Pro);
    for id in ["c1", "c2", "c3"] {
        h.add_content(id, &[Platform::Facebook]);
    }
    let mut config = fast_config();
    // one worker so the cap check and increment never interleave
    config.workers.worker_count = 1;
    if let Some(pro) = config.quota.plans.get_mut(&PlanTier::Pro) {
        pro.max_auto_posts = Some(2);
    }
    let engine = h.builder(config).build().unwrap();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into(), "c2".into(), "c3".into()], None)
        .unwrap();
    assert_eq!(outcome.scheduled_count, 3);
    h.drive(&engine);

    assert_eq!(h.provider.call_count(), 2);
    let statuses: Vec<ScheduleStatus> = outcome
        .records
        .iter()
        .map(|r| h.item(r).status())
        .collect();
    assert_eq!(
        statuses,
        vec![
            ScheduleStatus::Published,
            ScheduleStatus::Published,
            ScheduleStatus::Failed
        ]
    );
    assert!(h
        .item(&outcome.records[2])
        .error_message()
        .unwrap()
        .starts_with("QuotaExceeded"));

    let eligibility = engine
        .check_eligibility(&"t1".into(), QuotaAction::AutoPost)
        .unwrap();
    assert!(!eligibility.allowed);
    assert_eq!(eligibility.used, 2);
    assert_eq!(eligibility.limit, Some(2));
    engine.shutdown();
}

// ============================================================================
// RETRIES AND CALLBACKS
// ============================================================================

#[test]
fn transient_provider_error_is_retried() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);
    h.provider
        .push_response(Err(ProviderError::RateLimited { retry_after_secs: Some(1) }));
    let engine = h.engine();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    h.drive(&engine);

    assert_eq!(h.provider.call_count(), 2);
    let item = h.item(&outcome.records[0]);
    assert_eq!(item.status(), ScheduleStatus::Published);
    assert!(item.error_message().is_none());
    engine.shutdown();
}

#[test]
fn exhausted_retries_leave_item_failed() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);
    for _ in 0..3 {
        h.provider.push_response(Err(ProviderError::Status {
            status: 503,
            body: "unavailable".into(),
        }));
    }
    let engine = h.engine();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    h.drive(&engine);

    assert_eq!(h.provider.call_count(), 3);
    let item = h.item(&outcome.records[0]);
    assert_eq!(item.status(), ScheduleStatus::Failed);
    assert_eq!(
        item.error_message(),
        Some("Provider: provider returned HTTP 503: unavailable")
    );
    assert_eq!(h.audit.events_of_type("publish.failed").len(), 1);
    assert_eq!(engine.stats().pending, 0);
    engine.shutdown();
}

#[test]
fn provider_callback_updates_item() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);
    let engine = h.engine();
    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    h.drive(&engine);

    let updated = engine
        .handle_provider_callback(&ProviderCallback {
            provider_job_id: "job-1".into(),
            status: CallbackStatus::Published,
            post_url: Some("https://fb.example/p/42".into()),
            error: None,
        })
        .unwrap();
    assert_eq!(updated.id(), outcome.records[0].id());
    assert_eq!(updated.result_url(), Some("https://fb.example/p/42"));

    let unknown = engine.handle_provider_callback(&ProviderCallback {
        provider_job_id: "job-404".into(),
        status: CallbackStatus::Failed,
        post_url: None,
        error: None,
    });
    assert!(matches!(unknown, Err(SchedulerError::NotFound(_))));
    engine.shutdown();
}

// ============================================================================
// CANCELLATION, READ PATHS AND RECONCILIATION
// ============================================================================

#[test]
fn cancel_removes_jobs_and_restores_content() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook, Platform::Instagram]);
    let engine = h.engine();

    let outcome = engine
        .schedule_content(&"t1".into(), &["c1".into()], None)
        .unwrap();
    let upcoming = engine.get_upcoming_schedule(&"t1".into(), 10).unwrap();
    assert_eq!(upcoming.len(), 2);
    assert!(upcoming[0].scheduled_for() < upcoming[1].scheduled_for());
    assert_eq!(engine.get_upcoming_schedule(&"t1".into(), 1).unwrap().len(), 1);

    engine.cancel_schedule(outcome.records[0].id()).unwrap();
    assert_eq!(engine.stats().pending, 1);
    assert_eq!(h.content_status("c1"), ContentStatus::Scheduled);
    assert_eq!(engine.get_upcoming_schedule(&"t1".into(), 10).unwrap().len(), 1);

    engine.cancel_schedule(outcome.records[1].id()).unwrap();
    assert_eq!(engine.stats().pending, 0);
    assert_eq!(h.content_status("c1"), ContentStatus::Approved);
    assert_eq!(h.audit.events_of_type("schedule.cancelled").len(), 2);
    engine.shutdown();
}

#[test]
fn reconcile_rearms_queued_items_without_jobs() {
    let h = Harness::new(PlanTier::Pro);
    h.add_content("c1", &[Platform::Facebook]);
    h.store
        .commit_schedule(ScheduleBatch {
            content_ids: vec!["c1".into()],
            items: vec![ScheduleItem::new(
                "t1".into(),
                "c1".into(),
                Platform::Facebook,
                utc("2030-03-11T09:00:00Z"),
                "fb-1",
                utc(NOW),
            )],
        })
        .unwrap();

    let engine = h.builder(fast_config()).reconcile_on_start(false).build().unwrap();
    assert_eq!(engine.stats().pending, 0);
    assert_eq!(engine.reconcile().unwrap(), 1);
    assert_eq!(engine.reconcile().unwrap(), 0);
    assert_eq!(engine.stats().pending, 1);
    engine.shutdown();
}

#[test]
fn api_reports_precondition_reason() {
    let h = Harness::new(PlanTier::Pro);
    let engine = h.engine();

    let err = submit_schedule(
        &engine,
        &ScheduleRequest {
            tenant_id: "t-unknown".into(),
            content_ids: vec!["c1".into()],
            start_date: None,
        },
    )
    .unwrap_err();
    assert_eq!(err.code, "DestinationNotVerified");
    assert_eq!(err.reason, "destination not verified for tenant t-unknown");
    assert!(err.precondition);

    let health = engine.health();
    assert!(health.ok);
    assert_eq!(health.pending_jobs, 0);
    engine.shutdown();
}
