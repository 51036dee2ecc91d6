//! Discord Wire Types
//!
//! The subset of REST objects and gateway payloads the relay reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::join::MemberRecord;
use crate::util::display_tag;

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Creation instant encoded in a snowflake id.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let millis = i64::try_from(raw >> 22).ok()? + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis)
}

/// Gateway opcodes.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Gateway intent bits.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    /// Privileged; must be enabled for the application in the developer portal.
    pub const GUILD_MEMBERS: u64 = 1 << 1;
}

/// A user object.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn tag(&self) -> String {
        display_tag(&self.username, self.discriminator.as_deref())
    }
}

/// A channel object; only the id is needed to send messages.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
}

/// Incoming gateway frame.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// `d` of opcode 10.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

/// `d` of the `READY` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    pub user: User,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnavailableGuild {
    pub id: String,
    #[serde(default)]
    pub unavailable: Option<bool>,
}

/// `d` of `GUILD_CREATE` / `GUILD_UPDATE` / `GUILD_DELETE`.
#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub unavailable: Option<bool>,
}

/// `d` of `GUILD_MEMBER_ADD`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMemberAdd {
    pub guild_id: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub joined_at: Option<String>,
}

impl GuildMemberAdd {
    /// Convert into a member record, attaching the cached guild name.
    ///
    /// Returns `None` when the payload has no user object.
    pub fn into_member_record(self, guild_name: Option<String>) -> Option<MemberRecord> {
        let user = self.user?;
        let joined_at = self
            .joined_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(MemberRecord {
            account_created_at: snowflake_timestamp(&user.id),
            user_id: user.id,
            username: user.username,
            discriminator: user.discriminator,
            joined_at,
            guild_id: self.guild_id,
            guild_name,
        })
    }
}
