//! Tests for audit sink

use prometheus_publisher::core::{
    build_audit_event, emit, AuditSeverity, AuditSink, InMemoryAuditSink,
};
use serde_json::json;

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "tenant1",
        "schedule.created",
        "schedule_item",
        "item-1",
        AuditSeverity::Info,
        json!({ "platform": "facebook" }),
    );

    sink.record(event).unwrap();
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tenant.as_str(), "tenant1");
    assert_eq!(events[0].event_type, "schedule.created");
    assert_eq!(events[0].entity_id, "item-1");
    assert_eq!(events[0].metadata["platform"], "facebook");
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    for id in ["a", "b", "c"] {
        emit(
            &sink,
            build_audit_event("t", "publish.succeeded", "schedule_item", id, AuditSeverity::Info, json!({})),
        );
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].entity_id, "b"); // oldest dropped
    assert_eq!(events[1].entity_id, "c");
}

#[test]
fn test_events_of_type_filters() {
    let sink = InMemoryAuditSink::new(10);
    emit(
        &sink,
        build_audit_event("t", "publish.failed", "schedule_item", "x", AuditSeverity::Critical, json!({})),
    );
    emit(
        &sink,
        build_audit_event("t", "schedule.cancelled", "schedule_item", "y", AuditSeverity::Info, json!({})),
    );

    let failed = sink.events_of_type("publish.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].severity, AuditSeverity::Critical);
    assert!(sink.events_of_type("publish.succeeded").is_empty());
}

#[test]
fn test_event_serializes_severity_snake_case() {
    let event = build_audit_event("t", "publish.failed", "schedule_item", "x", AuditSeverity::Warning, json!({}));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["severity"], "warning");
    assert_eq!(value["tenant"], "t");
    assert!(!value["event_id"].as_str().unwrap().is_empty());
}
