//! Join Relay
//!
//! Listens for "member joined" events on a Discord bot gateway, records each
//! join with a persistence API and direct-messages an operator when the API
//! accepts the event.

pub mod config;
pub mod delivery;
pub mod discord;
pub mod health;
pub mod join;
pub mod notify;
pub mod util;
