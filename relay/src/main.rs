//! Join Relay - Main Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use join_relay::config::Config;
use join_relay::delivery::{DeliveryClient, HttpTransport};
use join_relay::discord::{DiscordRest, Gateway, GatewayState};
use join_relay::health;
use join_relay::join::JoinListener;
use join_relay::notify::DiscordNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Gateway websocket TLS runs on rustls and needs a process-wide provider
    let _ =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,join_relay=debug".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting join relay");
    config.log_summary();

    let state = Arc::new(GatewayState::new());

    let rest = DiscordRest::new(&config.bot_token, config.discord_api_url.clone())
        .context("Failed to build Discord REST client")?;
    let bot = rest
        .current_user()
        .await
        .context("Failed to fetch bot identity, check BOT_TOKEN")?;
    state.set_bot_tag(bot.tag());
    info!(bot = %bot.tag(), bot_id = %bot.id, "Authenticated with Discord");

    let notifier = DiscordNotifier::connect(rest, config.admin_user_id.as_deref(), &bot.id).await;

    let delivery = match &config.api_url {
        Some(url) => {
            let transport = HttpTransport::new(
                url.clone(),
                config.api_shared_secret.clone(),
                config.delivery.request_timeout,
            )
            .context("Failed to build persistence API client")?;
            Some(DeliveryClient::new(transport, config.delivery))
        }
        None => None,
    };
    let listener = JoinListener::new(delivery, notifier);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let health_task = {
        let state = Arc::clone(&state);
        let bind_address = config.bind_address.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = health::serve(&bind_address, state, shutdown).await {
                error!(address = %bind_address, error = %e, "Health endpoint failed");
            }
        })
    };

    let gateway = Gateway::new(
        config.bot_token.clone(),
        config.discord_gateway_url.clone(),
        state,
    );

    let result = tokio::select! {
        res = gateway.run(&listener) => res.context("Gateway stopped"),
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to install CTRL+C signal handler")?;
            info!("Received shutdown signal, cleaning up...");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(());
    let _ = health_task.await;
    info!("Relay shutdown complete");

    result
}
