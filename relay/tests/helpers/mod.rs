//! Reusable helpers for HTTP integration tests.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] to run an axum router on a random local port.
//! [`spawn_mock_api()`] and [`spawn_mock_discord()`] build on it to stand in
//! for the persistence API and the Discord REST API, recording every request.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use join_relay::join::JoinEvent;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}

// ============================================================================
// Mock persistence API
// ============================================================================

/// One scripted response of the mock persistence API.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub body: &'static str,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub const fn new(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body,
            delay: None,
        }
    }

    pub const fn success() -> Self {
        Self::new(StatusCode::OK, r#"{"status":"success"}"#)
    }

    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A request as seen by the mock persistence API.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub api_key: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockApiState {
    responses: Arc<Vec<MockResponse>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockApi {
    pub server: TestServer,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockApi {
    /// Endpoint URL to configure as `API_URL`.
    pub fn endpoint(&self) -> String {
        format!("{}/joins", self.server.url)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn record_join(
    State(state): State<MockApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let index = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(RecordedRequest {
            api_key: header(&headers, "x-api-key"),
            content_type: header(&headers, "content-type"),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        requests.len() - 1
    };

    let response = &state.responses[index.min(state.responses.len() - 1)];
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }
    (response.status, response.body.to_string())
}

/// Spawn a mock persistence API at `/joins`. Responses are served in order;
/// the last one repeats.
pub async fn spawn_mock_api(responses: Vec<MockResponse>) -> MockApi {
    assert!(!responses.is_empty(), "mock API needs at least one response");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = MockApiState {
        responses: Arc::new(responses),
        requests: Arc::clone(&requests),
    };

    let router = Router::new()
        .route("/joins", post(record_join))
        .with_state(state);

    MockApi {
        server: spawn_test_server(router).await,
        requests,
    }
}

// ============================================================================
// Mock Discord REST API
// ============================================================================

/// A message sent through the mock Discord API.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub content: String,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct MockDiscordState {
    /// Users that `GET /users/{id}` knows about.
    known_users: Arc<Vec<String>>,
    messages: Arc<Mutex<Vec<SentMessage>>>,
}

pub struct MockDiscord {
    pub server: TestServer,
    messages: Arc<Mutex<Vec<SentMessage>>>,
}

impl MockDiscord {
    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().unwrap().clone()
    }
}

pub const BOT_USER_ID: &str = "900000000000000001";

async fn current_user() -> Json<Value> {
    Json(json!({
        "id": BOT_USER_ID,
        "username": "join-relay",
        "discriminator": "0001",
        "bot": true
    }))
}

async fn get_user(
    State(state): State<MockDiscordState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.known_users.contains(&user_id) {
        (
            StatusCode::OK,
            Json(json!({ "id": user_id, "username": "operator", "discriminator": "0" })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Unknown User", "code": 10013 })),
        )
    }
}

async fn open_dm(Json(body): Json<Value>) -> Json<Value> {
    let recipient = body["recipient_id"].as_str().unwrap_or_default();
    Json(json!({ "id": format!("dm-{recipient}"), "type": 1 }))
}

async fn send_message(
    State(state): State<MockDiscordState>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.messages.lock().unwrap().push(SentMessage {
        channel_id: channel_id.clone(),
        content: body["content"].as_str().unwrap_or_default().to_string(),
        authorization: header(&headers, "authorization"),
    });
    Json(json!({ "id": "1", "channel_id": channel_id }))
}

/// Spawn a mock of the Discord REST endpoints the notifier uses.
pub async fn spawn_mock_discord(known_users: &[&str]) -> MockDiscord {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let state = MockDiscordState {
        known_users: Arc::new(known_users.iter().map(|u| u.to_string()).collect()),
        messages: Arc::clone(&messages),
    };

    let router = Router::new()
        .route("/users/@me", get(current_user))
        .route("/users/@me/channels", post(open_dm))
        .route("/users/{user_id}", get(get_user))
        .route("/channels/{channel_id}/messages", post(send_message))
        .with_state(state);

    MockDiscord {
        server: spawn_test_server(router).await,
        messages,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn sample_event() -> JoinEvent {
    JoinEvent::new(
        "80351110224678912",
        "nelly",
        Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap(),
        "41771983423143937",
        "Rust Hangout",
        None,
    )
    .expect("valid sample event")
}
