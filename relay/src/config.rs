//! Relay Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::delivery::{DeliveryPolicy, MAX_ATTEMPTS, POST_TIMEOUT, RETRY_BASE_DELAY};
use crate::discord::{DEFAULT_API_BASE, DEFAULT_GATEWAY_URL};
use crate::util::mask;

/// Relay configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Bot credential for the gateway and REST API
    pub bot_token: String,

    /// Persistence API endpoint; delivery is disabled when unset
    pub api_url: Option<String>,

    /// Account that receives join notifications
    pub admin_user_id: Option<String>,

    /// Sent as `X-API-KEY` when set
    pub api_shared_secret: Option<String>,

    /// Health endpoint bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    pub discord_api_url: String,

    pub discord_gateway_url: String,

    /// Attempts, backoff base and per-attempt timeout for delivery
    pub delivery: DeliveryPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &mask(Some(&self.bot_token)))
            .field("api_url", &mask(self.api_url.as_deref()))
            .field("admin_user_id", &self.admin_user_id)
            .field("api_shared_secret", &mask(self.api_shared_secret.as_deref()))
            .field("bind_address", &self.bind_address)
            .field("discord_api_url", &self.discord_api_url)
            .field("discord_gateway_url", &self.discord_gateway_url)
            .field("delivery", &self.delivery)
            .finish()
    }
}

/// Read a variable, treating an empty or blank value as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    optional(key).and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?;
        if bot_token.trim().is_empty() {
            bail!("BOT_TOKEN must not be empty");
        }

        let bind_address = optional("BIND_ADDRESS").unwrap_or_else(|| {
            let port = parsed::<u16>("PORT").unwrap_or(8080);
            format!("0.0.0.0:{port}")
        });

        let delivery = DeliveryPolicy::new(
            parsed("DELIVERY_MAX_ATTEMPTS").unwrap_or(MAX_ATTEMPTS),
            parsed("DELIVERY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(RETRY_BASE_DELAY),
            parsed("DELIVERY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(POST_TIMEOUT),
        );

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            api_url: optional("API_URL"),
            admin_user_id: optional("ADMIN_USER_ID"),
            api_shared_secret: optional("API_SHARED_SECRET"),
            bind_address,
            discord_api_url: optional("DISCORD_API_URL").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            discord_gateway_url: optional("DISCORD_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.into()),
            delivery,
        })
    }

    #[must_use]
    pub const fn has_api(&self) -> bool {
        self.api_url.is_some()
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_summary(&self) {
        info!(
            bot_token = %mask(Some(&self.bot_token)),
            api_url = %mask(self.api_url.as_deref()),
            api_shared_secret = %mask(self.api_shared_secret.as_deref()),
            admin_user_id = %self.admin_user_id.as_deref().unwrap_or("<not set>"),
            bind_address = %self.bind_address,
            max_attempts = self.delivery.max_attempts,
            base_delay_ms = self.delivery.base_delay.as_millis() as u64,
            timeout_ms = self.delivery.request_timeout.as_millis() as u64,
            "Configuration loaded"
        );

        if self.api_url.is_none() {
            warn!("API_URL not set, joins will be logged but not recorded");
        } else if self.api_shared_secret.is_none() {
            warn!("API_SHARED_SECRET not set, requests to the persistence API are unauthenticated");
        }
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bot_token: "test-bot-token".into(),
            api_url: Some("http://127.0.0.1:9/joins".into()),
            admin_user_id: None,
            api_shared_secret: Some("test-secret".into()),
            bind_address: "127.0.0.1:8080".into(),
            discord_api_url: DEFAULT_API_BASE.into(),
            discord_gateway_url: DEFAULT_GATEWAY_URL.into(),
            delivery: DeliveryPolicy::default(),
        }
    }
}
