//! Delivery Types
//!
//! Retry policy, outcome classification and errors for join event delivery.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Maximum delivery attempts per join event.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles for each further attempt.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for a single POST, including reading the response body.
pub const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// `status` marker the persistence API returns when the join was recorded.
pub const STATUS_SUCCESS: &str = "success";

/// `status` marker the persistence API returns for unmonitored communities.
pub const STATUS_IGNORED: &str = "ignored";

/// Retry and timeout parameters for the delivery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            request_timeout: POST_TIMEOUT,
        }
    }
}

impl DeliveryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, request_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            request_timeout,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Raw response of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The `status` field of a persistence API response body.
///
/// Bodies that are not JSON objects, or lack a string `status`, parse as
/// an acknowledgement without status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiAck {
    pub status: Option<String>,
}

impl ApiAck {
    pub fn parse(body: &str) -> Self {
        let status = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("status").and_then(Value::as_str).map(str::to_owned));
        Self { status }
    }

    /// Whether the API recorded the event.
    ///
    /// A 200 without an `ignored` marker counts as accepted even when the
    /// body carries no status at all.
    pub fn is_accepted(&self, http_status: u16) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS)
            || (http_status == 200 && self.status.as_deref() != Some(STATUS_IGNORED))
    }

    pub fn is_ignored(&self) -> bool {
        self.status.as_deref() == Some(STATUS_IGNORED)
    }
}

/// Delivery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transport error: {message}")]
    Transport { message: String, timed_out: bool },
    #[error("rejected with HTTP {status}: {body}")]
    ClientRejection { status: u16, body: String },
    #[error("HTTP {status} (server error or rate limit): {body}")]
    ServerOrRateLimit { status: u16, body: String },
    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("HTTP {status} without acknowledgement: {body}")]
    NotAcknowledged { status: u16, body: String },
    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::ClientRejection { status, .. }
            | Self::ServerOrRateLimit { status, .. }
            | Self::UnexpectedStatus { status, .. }
            | Self::NotAcknowledged { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
        }
    }
}

/// Terminal result of delivering one join event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Ignored,
    /// Client error (4xx other than 429); never retried.
    Rejected(DeliveryError),
    /// All attempts used up.
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Ignored => "ignored",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
}
