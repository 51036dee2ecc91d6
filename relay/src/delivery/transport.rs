//! Delivery Transport
//!
//! The seam between the retry state machine and the network. The production
//! implementation POSTs JSON with `reqwest`; tests substitute scripted
//! transports.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use super::types::{DeliveryError, TransportResponse};
use crate::join::JoinPayload;

/// Header carrying the pre-shared secret.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Performs a single delivery attempt.
pub trait DeliveryTransport: Send + Sync {
    /// POST the payload once. Only `DeliveryError::Transport` may be returned;
    /// every received HTTP response is `Ok`, whatever its status.
    fn post(
        &self,
        payload: &JoinPayload,
    ) -> impl Future<Output = Result<TransportResponse, DeliveryError>> + Send;
}

/// `reqwest`-backed transport for the persistence API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }
}

impl DeliveryTransport for HttpTransport {
    async fn post(&self, payload: &JoinPayload) -> Result<TransportResponse, DeliveryError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        Ok(TransportResponse { status, body })
    }
}

fn transport_error(err: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport {
        message: err.to_string(),
        timed_out: err.is_timeout(),
    }
}
