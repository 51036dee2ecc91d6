//! Discord Platform Adapter
//!
//! Gateway session for join events and REST calls for direct messages.

pub mod cache;
pub mod gateway;
pub mod model;
pub mod rest;

pub use cache::{GatewayState, GuildInfo};
pub use gateway::{Gateway, GatewayError, MemberJoinHandler, DEFAULT_GATEWAY_URL};
pub use model::{snowflake_timestamp, User};
pub use rest::{DiscordError, DiscordRest, DEFAULT_API_BASE};
