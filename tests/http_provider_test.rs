//! Integration tests for `HttpPostingProvider` using wiremock HTTP mocks.

use prometheus_publisher::config::ProviderConfig;
use prometheus_publisher::core::{PostingProvider, ProviderError, PublishRequest};
use prometheus_publisher::infra::HttpPostingProvider;
use prometheus_publisher::util::Platform;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_provider(base_url: &str) -> HttpPostingProvider {
    HttpPostingProvider::new(&ProviderConfig {
        base_url: base_url.to_owned(),
        api_key: Some("test-key".into()),
        timeout_secs: 5,
    })
    .expect("client construction should not fail")
}

fn request() -> PublishRequest {
    PublishRequest {
        destination_id: "fb-page-1".into(),
        platform: Platform::Facebook,
        text: "Fresh bread today\n\n#bakery".into(),
        media_urls: vec!["https://cdn.example/bread.jpg".into()],
        idempotency_key: "item-1".into(),
    }
}

#[tokio::test]
async fn publish_sends_frozen_destination_and_parses_response() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "success": true,
        "provider_job_id": "job-77",
        "per_platform": [
            { "platform": "facebook", "status": "success", "post_id": "p1",
              "post_url": "https://facebook.com/p1" }
        ],
        "errors": []
    });

    Mock::given(method("POST"))
        .and(path("/post"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "destination_id": "fb-page-1",
            "platform": "facebook",
            "idempotency_key": "item-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let provider = test_provider(&server.uri());
    let resp = provider.publish(request()).await.expect("should publish");

    assert!(resp.success);
    assert_eq!(resp.provider_job_id.as_deref(), Some("job-77"));
    assert_eq!(resp.post_url().as_deref(), Some("https://facebook.com/p1"));
}

#[tokio::test]
async fn rejection_is_returned_as_tagged_response() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "success": false,
        "errors": [{ "platform": "facebook", "code": "DUPLICATE", "message": "duplicate post" }]
    });
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let resp = test_provider(&server.uri())
        .publish(request())
        .await
        .expect("should decode");
    assert!(!resp.success);
    assert_eq!(resp.error_summary(), "[facebook/DUPLICATE] duplicate post");
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
        .mount(&server)
        .await;

    let err = test_provider(&server.uri())
        .publish(request())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(12)
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_errors_are_retryable_client_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_partial_json(serde_json::json!({ "idempotency_key": "item-1" })))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_partial_json(serde_json::json!({ "idempotency_key": "item-2" })))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let provider = test_provider(&server.uri());
    let err = provider.publish(request()).await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::Status {
            status: 502,
            body: "bad gateway".into()
        }
    );
    assert!(err.is_retryable());

    let mut second = request();
    second.idempotency_key = "item-2".into();
    let err = provider.publish(second).await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = test_provider(&server.uri())
        .publish(request())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    // nothing listens on port 9 (discard) in the test environment
    let err = test_provider("http://127.0.0.1:9")
        .publish(request())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
    assert!(err.is_retryable());
}
