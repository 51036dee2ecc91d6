//! Discord REST Client
//!
//! Minimal bot-authenticated REST calls: identity lookup, user lookup,
//! DM channel creation and message send.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::model::{Channel, User};

/// Default REST base URL (API v10).
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Discord REST errors.
#[derive(Error, Debug)]
pub enum DiscordError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Discord API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid bot token header value")]
    InvalidToken,
}

/// Bot-authenticated REST client. Cheap to clone.
#[derive(Clone)]
pub struct DiscordRest {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for DiscordRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordRest")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateDm<'a> {
    recipient_id: &'a str,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

impl DiscordRest {
    pub fn new(token: &str, base_url: impl Into<String>) -> Result<Self, DiscordError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| DiscordError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DiscordError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DiscordError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DiscordError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// The bot's own user.
    pub async fn current_user(&self) -> Result<User, DiscordError> {
        self.get("/users/@me").await
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<User, DiscordError> {
        self.get(&format!("/users/{user_id}")).await
    }

    /// Open (or reuse) the DM channel with a user.
    pub async fn open_dm(&self, recipient_id: &str) -> Result<Channel, DiscordError> {
        self.post("/users/@me/channels", &CreateDm { recipient_id })
            .await
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DiscordError> {
        let _: serde_json::Value = self
            .post(
                &format!("/channels/{channel_id}/messages"),
                &CreateMessage { content },
            )
            .await?;
        Ok(())
    }
}
