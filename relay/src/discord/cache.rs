//! Gateway State
//!
//! Guild metadata and readiness observed by the gateway session. The session
//! is the only writer; the health endpoint reads it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use dashmap::DashMap;

/// Cached guild metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub name: String,
    pub member_count: Option<u64>,
}

#[derive(Debug, Default)]
pub struct GatewayState {
    guilds: DashMap<String, GuildInfo>,
    bot_tag: OnceLock<String>,
    ready: AtomicBool,
}

impl GatewayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_guild(&self, guild_id: &str, info: GuildInfo) {
        self.guilds.insert(guild_id.to_string(), info);
    }

    pub fn remove_guild(&self, guild_id: &str) -> Option<GuildInfo> {
        self.guilds.remove(guild_id).map(|(_, info)| info)
    }

    pub fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        self.guilds.get(guild_id).map(|g| g.clone())
    }

    pub fn guild_name(&self, guild_id: &str) -> Option<String> {
        self.guilds.get(guild_id).map(|g| g.name.clone())
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Record the bot identity. Only the first call has an effect.
    pub fn set_bot_tag(&self, tag: impl Into<String>) {
        let _ = self.bot_tag.set(tag.into());
    }

    pub fn bot_tag(&self) -> Option<&str> {
        self.bot_tag.get().map(String::as_str)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
