//! Tests for error types

use prometheus_publisher::core::SchedulerError;

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("publish-jobs".to_string());
    assert_eq!(format!("{err}"), "queue full: publish-jobs");
    assert!(!err.is_precondition());
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
    assert_eq!(err.code(), "Backend");
}

#[test]
fn test_precondition_errors_carry_reason() {
    let err = SchedulerError::DestinationNotVerified("tenant-1".into());
    assert_eq!(err.to_string(), "destination not verified for tenant tenant-1");
    assert!(err.is_precondition());

    let err = SchedulerError::NoEligibleContent;
    assert_eq!(err.code(), "NoEligibleContent");
    assert!(err.is_precondition());

    let err = SchedulerError::QuotaExceeded("auto-posting not included in plan".into());
    assert_eq!(
        err.to_string(),
        "quota exceeded: auto-posting not included in plan"
    );
    assert!(err.is_precondition());
}

#[test]
fn test_state_errors_are_not_preconditions() {
    assert!(!SchedulerError::NotFound("item".into()).is_precondition());
    assert!(!SchedulerError::InvalidState("published".into()).is_precondition());
    assert!(!SchedulerError::Config("bad".into()).is_precondition());
}
