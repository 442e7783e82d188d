//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};
use prometheus_publisher::util::{
    Clock, ContentId, JobKey, ManualClock, Platform, ScheduleItemId, TenantId,
};

#[test]
fn test_string_ids_round_trip_as_plain_strings() {
    let tenant: TenantId = serde_json::from_str("\"acme\"").unwrap();
    assert_eq!(tenant, TenantId::from("acme"));
    assert_eq!(serde_json::to_string(&ContentId::from("post-1")).unwrap(), "\"post-1\"");
}

#[test]
fn test_job_key_per_schedule_item() {
    let a = ScheduleItemId::new();
    let b = ScheduleItemId::new();
    assert_ne!(a, b);
    assert_ne!(JobKey::for_schedule_item(a), JobKey::for_schedule_item(b));
    assert_eq!(
        JobKey::for_schedule_item(a).as_str(),
        format!("publish:{a}")
    );
}

#[test]
fn test_platform_names() {
    assert_eq!(Platform::Instagram.to_string(), "instagram");
    assert_eq!(Platform::Tiktok.as_str(), "tiktok");
    let parsed: Platform = serde_json::from_str("\"linkedin\"").unwrap();
    assert_eq!(parsed, Platform::Linkedin);
}

#[test]
fn test_manual_clock_set_and_advance() {
    let start = Utc.with_ymd_and_hms(2030, 3, 5, 8, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    clock.advance(Duration::minutes(90));
    assert_eq!(clock.now(), start + Duration::minutes(90));

    let shared = clock.clone();
    shared.set(start);
    assert_eq!(clock.now(), start);
}
