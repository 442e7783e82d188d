//! Tests for API payloads

use prometheus_publisher::core::SchedulerError;
use prometheus_publisher::runtime::{ErrorResponse, ScheduleRequest};

#[test]
fn test_schedule_request_with_start_date() {
    let req: ScheduleRequest = serde_json::from_str(
        r#"{"tenant_id":"t1","content_ids":["c1"],"start_date":"2030-03-10"}"#,
    )
    .unwrap();
    assert_eq!(req.tenant_id.as_str(), "t1");
    assert_eq!(req.start_date.unwrap().to_string(), "2030-03-10");
}

#[test]
fn test_error_response_for_backend_failure() {
    let resp = ErrorResponse::from(&SchedulerError::Backend("db down".into()));
    assert_eq!(resp.code, "Backend");
    assert_eq!(resp.reason, "backend error: db down");
    assert!(!resp.precondition);
}

#[test]
fn test_error_response_serializes() {
    let resp = ErrorResponse::from(&SchedulerError::NoEligibleContent);
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value["code"], "NoEligibleContent");
    assert_eq!(value["precondition"], true);
}
