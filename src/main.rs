use std::sync::Arc;

use anyhow::Context;
use pti_uploader::config::RelayConfig;
use pti_uploader::relay::{Relay, RelaySettings, TelegramClient};
use pti_uploader::server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting PTI relay");

    let config = RelayConfig::from_env().context("Failed to load relay configuration")?;
    log::debug!("Relay configuration: {:?}", config);

    let client = TelegramClient::new(&config)?;
    let relay = Relay::new(Arc::new(client), RelaySettings::from(&config));

    let app = build_router(AppState {
        relay: Arc::new(relay),
        pacing_delay: config.pacing_delay(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    log::info!(
        "Relay listening on {} (chat {}, thread {:?}, group delay {}ms)",
        config.bind_addr,
        config.telegram_chat_id,
        config.telegram_thread_id,
        config.group_delay_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
