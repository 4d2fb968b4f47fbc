//! Hookline Game Server
//!
//! Loads configuration from `HOOKLINE_*` environment variables, builds the
//! demo arena and serves it over WebSocket until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hookline::{
    GameMap, ServerConfig, VERSION,
    network::GameServer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let map = Arc::new(GameMap::demo_arena().context("failed to build demo arena")?);

    info!("Hookline Server v{}", VERSION);
    info!(
        "Tick Rate: {} Hz, snapshot every {} ticks, {} players max, mode {:?}",
        config.match_config.tick_rate,
        config.snapshot_interval,
        config.max_players,
        config.match_config.mode,
    );
    info!("Map: {} ({}x{} tiles)", map.name, map.grid.width(), map.grid.height());

    let server = Arc::new(GameServer::new(config, map));
    let running = Arc::clone(&server);
    let mut handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut handle => {
            // Server exited on its own, e.g. the bind failed
            result
                .context("server task panicked")?
                .context("server stopped with an error")?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    handle
        .await
        .context("server task panicked")?
        .context("server stopped with an error")?;
    Ok(())
}
