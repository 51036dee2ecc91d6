//! Join Event Delivery
//!
//! Authenticated HTTP delivery of join events to the persistence API with
//! bounded retries, exponential backoff and accept/ignore/reject
//! classification.

pub mod client;
pub mod transport;
pub mod types;

pub use client::{classify, DeliveryClient, Step};
pub use transport::{DeliveryTransport, HttpTransport, API_KEY_HEADER};
pub use types::{
    ApiAck, DeliveryError, DeliveryOutcome, DeliveryPolicy, DeliveryReport, TransportResponse,
    MAX_ATTEMPTS, POST_TIMEOUT, RETRY_BASE_DELAY,
};
