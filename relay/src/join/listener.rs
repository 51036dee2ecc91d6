//! Join Listener
//!
//! Turns member records from the gateway into join events and spawns one
//! delivery task per event. The gateway loop never waits on delivery.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::event::{JoinEvent, MemberRecord};
use crate::delivery::{DeliveryClient, DeliveryTransport};
use crate::discord::MemberJoinHandler;
use crate::notify::Notifier;

pub struct JoinListener<T, N> {
    /// `None` when no persistence API is configured.
    delivery: Option<Arc<DeliveryClient<T>>>,
    notifier: Arc<N>,
}

impl<T, N> JoinListener<T, N>
where
    T: DeliveryTransport + 'static,
    N: Notifier + 'static,
{
    pub fn new(delivery: Option<DeliveryClient<T>>, notifier: N) -> Self {
        Self {
            delivery: delivery.map(Arc::new),
            notifier: Arc::new(notifier),
        }
    }

    /// Build the join event and spawn its delivery task.
    ///
    /// Returns `None` when the record is invalid or delivery is disabled.
    pub fn dispatch(&self, member: MemberRecord) -> Option<JoinHandle<()>> {
        let event = match JoinEvent::from_member(&member, Utc::now()) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    user_id = %member.user_id,
                    guild_id = %member.guild_id,
                    error = %e,
                    "Dropping invalid join event"
                );
                return None;
            }
        };

        info!(
            user_id = %event.user_id(),
            username = %event.display_name(),
            server_id = %event.community_id(),
            server_name = %event.community_name(),
            "Member joined"
        );

        let Some(delivery) = &self.delivery else {
            info!(user_id = %event.user_id(), "API_URL not set, skipping delivery");
            return None;
        };

        let delivery = Arc::clone(delivery);
        let notifier = Arc::clone(&self.notifier);

        // Inner task isolates panics from the gateway.
        Some(tokio::spawn(async move {
            let user_id = event.user_id().to_string();
            let server_id = event.community_id().to_string();
            let handle = tokio::spawn(async move {
                delivery.deliver_and_notify(&event, notifier.as_ref()).await;
            });
            if let Err(e) = handle.await {
                error!(
                    user_id = %user_id,
                    server_id = %server_id,
                    "Join delivery task panicked: {}", e
                );
            }
        }))
    }
}

impl<T, N> MemberJoinHandler for JoinListener<T, N>
where
    T: DeliveryTransport + 'static,
    N: Notifier + 'static,
{
    fn on_member_join(&self, member: MemberRecord) {
        let _ = self.dispatch(member);
    }
}
