//! Delivery against a real HTTP endpoint.
//!
//! Run with: `cargo test -p join-relay --test delivery_http_test`

mod helpers;

use std::time::Duration;

use axum::http::StatusCode;
use helpers::{sample_event, spawn_mock_api, MockResponse};
use join_relay::delivery::{
    DeliveryClient, DeliveryError, DeliveryOutcome, DeliveryPolicy, HttpTransport,
};
use serde_json::Value;

/// Short backoff so retries finish quickly on the real clock.
fn fast_policy(request_timeout: Duration) -> DeliveryPolicy {
    DeliveryPolicy::new(3, Duration::from_millis(10), request_timeout)
}

fn client(url: String, api_key: Option<&str>, policy: DeliveryPolicy) -> DeliveryClient<HttpTransport> {
    let transport = HttpTransport::new(url, api_key.map(str::to_string), policy.request_timeout)
        .expect("Failed to build transport");
    DeliveryClient::new(transport, policy)
}

#[tokio::test]
async fn posts_payload_with_api_key() {
    let api = spawn_mock_api(vec![MockResponse::success()]).await;
    let client = client(api.endpoint(), Some("s3cret"), fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.outcome, DeliveryOutcome::Accepted);
    assert_eq!(report.attempts, 1);

    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.api_key.as_deref(), Some("s3cret"));
    assert!(request
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("application/json")));

    assert_eq!(request.body["user_id"], "80351110224678912");
    assert_eq!(request.body["username"], "nelly");
    assert_eq!(request.body["join_timestamp"], "2024-05-04T10:00:00+00:00");
    assert_eq!(request.body["server_id"], "41771983423143937");
    assert_eq!(request.body["server_name"], "Rust Hangout");
    // Present and null, not omitted
    assert_eq!(request.body.get("account_created_at"), Some(&Value::Null));
}

#[tokio::test]
async fn omits_api_key_when_unset() {
    let api = spawn_mock_api(vec![MockResponse::success()]).await;
    let client = client(api.endpoint(), None, fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert!(report.outcome.is_accepted());
    assert!(api.requests()[0].api_key.is_none());
}

#[tokio::test]
async fn retries_server_error_then_accepts() {
    let api = spawn_mock_api(vec![
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable"),
        MockResponse::success(),
    ])
    .await;
    let client = client(api.endpoint(), Some("s3cret"), fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.outcome, DeliveryOutcome::Accepted);
    assert_eq!(report.attempts, 2);
    assert_eq!(api.requests().len(), 2);
}

#[tokio::test]
async fn client_error_is_rejected_without_retry() {
    let api = spawn_mock_api(vec![MockResponse::new(
        StatusCode::BAD_REQUEST,
        r#"{"error":"missing server_id"}"#,
    )])
    .await;
    let client = client(api.endpoint(), Some("s3cret"), fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.attempts, 1);
    match report.outcome {
        DeliveryOutcome::Rejected(DeliveryError::ClientRejection { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("missing server_id"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(api.requests().len(), 1);
}

#[tokio::test]
async fn ignored_community_is_terminal() {
    let api = spawn_mock_api(vec![MockResponse::new(
        StatusCode::OK,
        r#"{"status":"ignored"}"#,
    )])
    .await;
    let client = client(api.endpoint(), None, fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.outcome, DeliveryOutcome::Ignored);
    assert_eq!(api.requests().len(), 1);
}

#[tokio::test]
async fn rate_limit_exhausts_attempts() {
    let api = spawn_mock_api(vec![MockResponse::new(
        StatusCode::TOO_MANY_REQUESTS,
        r#"{"status":"success"}"#,
    )])
    .await;
    let client = client(api.endpoint(), None, fast_policy(Duration::from_secs(5)));

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.attempts, 3);
    assert!(matches!(
        report.outcome,
        DeliveryOutcome::Failed(DeliveryError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(api.requests().len(), 3);
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let api = spawn_mock_api(vec![
        MockResponse::success().delayed(Duration::from_secs(2))
    ])
    .await;
    let policy = DeliveryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(100));
    let client = client(api.endpoint(), None, policy);

    let report = client.deliver(&sample_event()).await;
    assert_eq!(report.attempts, 2);
    match report.outcome {
        DeliveryOutcome::Failed(DeliveryError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(
                *last,
                DeliveryError::Transport { timed_out: true, .. }
            ));
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_fails_after_retries() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(format!("http://{addr}/joins"), None, fast_policy(Duration::from_secs(1)));
    let report = client.deliver(&sample_event()).await;

    assert_eq!(report.attempts, 3);
    assert!(matches!(report.outcome, DeliveryOutcome::Failed(_)));
}
