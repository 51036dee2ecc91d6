//! Member Joins
//!
//! Join events built from platform member records and the listener that
//! hands each one to its own delivery task.

mod event;
mod listener;

pub use event::{JoinEvent, JoinEventError, JoinPayload, MemberRecord};
pub use listener::JoinListener;
