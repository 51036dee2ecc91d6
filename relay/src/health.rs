//! Health Endpoint
//!
//! Liveness page for the hosting platform, backed by the gateway state.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::discord::GatewayState;
use crate::util::iso8601;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Bot tag, or `"starting"` before the identity is known
    pub bot: String,
    /// Guilds visible to the bot; 0 until the session is ready
    pub guilds: usize,
    /// Current UTC time
    pub uptime: String,
}

pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive",
        bot: state.bot_tag().unwrap_or("starting").to_string(),
        guilds: if state.is_ready() { state.guild_count() } else { 0 },
        uptime: iso8601(&Utc::now()),
    })
}

/// Serve the health endpoint until `shutdown` resolves.
pub async fn serve(
    bind_address: &str,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "Health endpoint listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
