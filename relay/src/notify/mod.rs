//! Join Notifications
//!
//! Direct-message notification of accepted joins to a single operator
//! account. The recipient is resolved once at startup and never mutated.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::discord::{DiscordError, DiscordRest};
use crate::join::JoinEvent;
use crate::util::iso8601;

/// Sends a notification for an accepted join.
pub trait Notifier: Send + Sync {
    fn notify_join(&self, event: &JoinEvent) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Notification errors. Logged by the caller, never retried.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to resolve recipient {user_id}: {source}")]
    Resolve {
        user_id: String,
        #[source]
        source: DiscordError,
    },
    #[error("failed to send direct message: {0}")]
    Send(#[source] DiscordError),
}

/// Message text for an accepted join.
pub fn join_message(event: &JoinEvent) -> String {
    format!(
        "🚨 New join in **{}**: {} (ID: {}) at {}",
        event.community_name(),
        event.display_name(),
        event.user_id(),
        iso8601(&event.join_timestamp())
    )
}

/// A resolved DM target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub tag: String,
    pub dm_channel_id: String,
}

/// Look up a user and open the DM channel with them.
pub async fn resolve_recipient(rest: &DiscordRest, user_id: &str) -> Result<Recipient, DiscordError> {
    let user = rest.fetch_user(user_id).await?;
    let channel = rest.open_dm(&user.id).await?;
    Ok(Recipient {
        tag: user.tag(),
        user_id: user.id,
        dm_channel_id: channel.id,
    })
}

/// Discord DM notifier.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    rest: DiscordRest,
    recipient: Option<Recipient>,
    /// Set when a recipient is configured but could not be resolved at
    /// startup; resolution is then attempted per notification.
    fallback_user_id: Option<String>,
}

impl DiscordNotifier {
    pub const fn new(
        rest: DiscordRest,
        recipient: Option<Recipient>,
        fallback_user_id: Option<String>,
    ) -> Self {
        Self {
            rest,
            recipient,
            fallback_user_id,
        }
    }

    /// Resolve the configured recipient once.
    pub async fn connect(rest: DiscordRest, admin_user_id: Option<&str>, bot_user_id: &str) -> Self {
        let Some(admin_id) = admin_user_id else {
            info!("ADMIN_USER_ID not set, join notifications disabled");
            return Self::new(rest, None, None);
        };

        if admin_id.parse::<u64>().is_err() {
            warn!(admin_user_id = %admin_id, "ADMIN_USER_ID is not a valid user id, join notifications disabled");
            return Self::new(rest, None, None);
        }

        if admin_id == bot_user_id {
            warn!("ADMIN_USER_ID is the bot's own id, join notifications disabled");
            return Self::new(rest, None, None);
        }

        match resolve_recipient(&rest, admin_id).await {
            Ok(recipient) => {
                info!(recipient = %recipient.tag, "Notification recipient cached");
                Self::new(rest, Some(recipient), None)
            }
            Err(e) => {
                warn!(
                    admin_user_id = %admin_id,
                    error = %e,
                    "Failed to resolve notification recipient, will retry per notification"
                );
                Self::new(rest, None, Some(admin_id.to_string()))
            }
        }
    }

    pub const fn recipient(&self) -> Option<&Recipient> {
        self.recipient.as_ref()
    }
}

impl Notifier for DiscordNotifier {
    async fn notify_join(&self, event: &JoinEvent) -> Result<(), NotifyError> {
        let content = join_message(event);

        let channel_id = match (&self.recipient, &self.fallback_user_id) {
            (Some(recipient), _) => recipient.dm_channel_id.clone(),
            (None, Some(user_id)) => {
                resolve_recipient(&self.rest, user_id)
                    .await
                    .map_err(|source| NotifyError::Resolve {
                        user_id: user_id.clone(),
                        source,
                    })?
                    .dm_channel_id
            }
            (None, None) => {
                debug!(user_id = %event.user_id(), "No notification recipient, skipping");
                return Ok(());
            }
        };

        self.rest
            .send_message(&channel_id, &content)
            .await
            .map_err(NotifyError::Send)?;

        info!(
            user_id = %event.user_id(),
            server_id = %event.community_id(),
            "Join notification sent"
        );
        Ok(())
    }
}
