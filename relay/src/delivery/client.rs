//! Delivery Client
//!
//! Explicit state machine for delivering one join event: up to
//! `max_attempts` POSTs with exponential backoff between them, terminating
//! on the first classified response. Accepted events trigger a notification.

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::transport::DeliveryTransport;
use super::types::{
    ApiAck, DeliveryError, DeliveryOutcome, DeliveryPolicy, DeliveryReport, TransportResponse,
};
use crate::join::JoinEvent;
use crate::notify::Notifier;

/// Result of classifying one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Terminal outcome, stop attempting.
    Done(DeliveryOutcome),
    /// Attempt failed in a way worth retrying.
    Retry(DeliveryError),
}

/// Classify a received HTTP response.
///
/// - 2xx: accepted / ignored from the body, otherwise retried.
/// - 4xx other than 429: rejected, never retried.
/// - 429 and 5xx: retried without looking at the body.
/// - Anything else (1xx/3xx): retried.
pub fn classify(response: &TransportResponse) -> Step {
    let TransportResponse { status, body } = response;
    let status = *status;

    match status {
        200..=299 => {
            let ack = ApiAck::parse(body);
            if ack.is_accepted(status) {
                Step::Done(DeliveryOutcome::Accepted)
            } else if ack.is_ignored() {
                Step::Done(DeliveryOutcome::Ignored)
            } else {
                Step::Retry(DeliveryError::NotAcknowledged {
                    status,
                    body: body.clone(),
                })
            }
        }
        429 | 500..=599 => Step::Retry(DeliveryError::ServerOrRateLimit {
            status,
            body: body.clone(),
        }),
        400..=499 => Step::Done(DeliveryOutcome::Rejected(DeliveryError::ClientRejection {
            status,
            body: body.clone(),
        })),
        _ => Step::Retry(DeliveryError::UnexpectedStatus {
            status,
            body: body.clone(),
        }),
    }
}

/// Delivers join events through a transport.
#[derive(Debug, Clone)]
pub struct DeliveryClient<T> {
    transport: T,
    policy: DeliveryPolicy,
}

impl<T: DeliveryTransport> DeliveryClient<T> {
    pub const fn new(transport: T, policy: DeliveryPolicy) -> Self {
        Self { transport, policy }
    }

    pub const fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the attempt loop for one event.
    pub async fn deliver(&self, event: &JoinEvent) -> DeliveryReport {
        let payload = event.payload();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let step = match timeout(self.policy.request_timeout, self.transport.post(&payload)).await
            {
                Ok(Ok(response)) => {
                    debug!(
                        user_id = %event.user_id(),
                        attempt,
                        status = response.status,
                        "Persistence API responded"
                    );
                    classify(&response)
                }
                Ok(Err(e)) => Step::Retry(e),
                Err(_) => Step::Retry(DeliveryError::Transport {
                    message: format!("request timed out after {:?}", self.policy.request_timeout),
                    timed_out: true,
                }),
            };

            let err = match step {
                Step::Done(outcome) => {
                    return DeliveryReport {
                        outcome,
                        attempts: attempt,
                    };
                }
                Step::Retry(err) => err,
            };

            warn!(
                user_id = %event.user_id(),
                server_id = %event.community_id(),
                attempt,
                max_attempts,
                status = ?err.status(),
                error = %err,
                "Join delivery attempt failed"
            );

            if attempt >= max_attempts {
                return DeliveryReport {
                    outcome: DeliveryOutcome::Failed(DeliveryError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    }),
                    attempts: attempt,
                };
            }

            sleep(self.policy.backoff(attempt)).await;
            attempt += 1;
        }
    }

    /// Deliver an event and, if the API accepted it, notify the recipient.
    ///
    /// Notification failures are logged and never change the outcome.
    pub async fn deliver_and_notify<N: Notifier>(
        &self,
        event: &JoinEvent,
        notifier: &N,
    ) -> DeliveryReport {
        let report = self.deliver(event).await;

        match &report.outcome {
            DeliveryOutcome::Accepted => {
                info!(
                    user_id = %event.user_id(),
                    username = %event.display_name(),
                    server_id = %event.community_id(),
                    attempts = report.attempts,
                    "Join recorded"
                );
                if let Err(e) = notifier.notify_join(event).await {
                    error!(
                        user_id = %event.user_id(),
                        server_id = %event.community_id(),
                        error = %e,
                        "Failed to send join notification"
                    );
                }
            }
            DeliveryOutcome::Ignored => {
                info!(
                    user_id = %event.user_id(),
                    server_id = %event.community_id(),
                    server_name = %event.community_name(),
                    "Join ignored: community is not monitored"
                );
            }
            DeliveryOutcome::Rejected(err) => {
                warn!(
                    user_id = %event.user_id(),
                    server_id = %event.community_id(),
                    attempts = report.attempts,
                    error = %err,
                    "Join rejected by persistence API"
                );
            }
            DeliveryOutcome::Failed(err) => {
                error!(
                    user_id = %event.user_id(),
                    server_id = %event.community_id(),
                    attempts = report.attempts,
                    error = %err,
                    "Join delivery failed after retries"
                );
            }
        }

        report
    }
}
