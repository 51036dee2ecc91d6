//! Join Event Types
//!
//! The platform-neutral member record handed over by the gateway, the
//! validated `JoinEvent` built from it and the JSON payload sent to the
//! persistence API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{display_tag, iso8601};

/// A member record as reported by the chat platform.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub user_id: String,
    pub username: String,
    /// Legacy discriminator; `None` or `"0"` for migrated accounts.
    pub discriminator: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub account_created_at: Option<DateTime<Utc>>,
    pub guild_id: String,
    /// Resolved from the guild cache; `None` if the guild was never seen.
    pub guild_name: Option<String>,
}

impl MemberRecord {
    /// Render the account the way the platform prints it (`name` or `name#1234`).
    pub fn tag(&self) -> String {
        display_tag(&self.username, self.discriminator.as_deref())
    }
}

/// Reasons a join event cannot be built.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JoinEventError {
    #[error("join event field `{0}` is empty")]
    EmptyField(&'static str),
}

/// A validated, immutable join event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEvent {
    user_id: String,
    display_name: String,
    join_timestamp: DateTime<Utc>,
    community_id: String,
    community_name: String,
    account_created_at: Option<DateTime<Utc>>,
}

impl JoinEvent {
    /// Build a join event, rejecting empty identifiers.
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        join_timestamp: DateTime<Utc>,
        community_id: impl Into<String>,
        community_name: impl Into<String>,
        account_created_at: Option<DateTime<Utc>>,
    ) -> Result<Self, JoinEventError> {
        let event = Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            join_timestamp,
            community_id: community_id.into(),
            community_name: community_name.into(),
            account_created_at,
        };

        let required = [
            ("user_id", &event.user_id),
            ("display_name", &event.display_name),
            ("community_id", &event.community_id),
            ("community_name", &event.community_name),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(JoinEventError::EmptyField(*name));
        }

        Ok(event)
    }

    /// Build a join event from a platform member record.
    ///
    /// A missing join instant falls back to `now`.
    pub fn from_member(member: &MemberRecord, now: DateTime<Utc>) -> Result<Self, JoinEventError> {
        Self::new(
            member.user_id.clone(),
            member.tag(),
            member.joined_at.unwrap_or(now),
            member.guild_id.clone(),
            member.guild_name.clone().unwrap_or_default(),
            member.account_created_at,
        )
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub const fn join_timestamp(&self) -> DateTime<Utc> {
        self.join_timestamp
    }

    pub fn community_id(&self) -> &str {
        &self.community_id
    }

    pub fn community_name(&self) -> &str {
        &self.community_name
    }

    pub const fn account_created_at(&self) -> Option<DateTime<Utc>> {
        self.account_created_at
    }

    /// Wire payload for the persistence API.
    pub fn payload(&self) -> JoinPayload {
        JoinPayload {
            user_id: self.user_id.clone(),
            username: self.display_name.clone(),
            join_timestamp: iso8601(&self.join_timestamp),
            server_id: self.community_id.clone(),
            server_name: self.community_name.clone(),
            account_created_at: self.account_created_at.as_ref().map(iso8601),
        }
    }
}

/// JSON body posted to the persistence API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub user_id: String,
    pub username: String,
    pub join_timestamp: String,
    pub server_id: String,
    pub server_name: String,
    /// Always serialized, as `null` when unknown.
    pub account_created_at: Option<String>,
}
