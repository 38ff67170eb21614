use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serpent_arena_server::config::ServerConfig;
use serpent_arena_server::game::constants::net::SHUTDOWN_DRAIN_MS;
use serpent_arena_server::lobby::manager::{RegistrySettings, RoomRegistry};
use serpent_arena_server::metrics::{self, Metrics};
use serpent_arena_server::net::game_session::GameSession;
use serpent_arena_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Serpent Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    info!(
        "Configuration loaded: {}:{}, max_rooms={}, players/room={}, bots/room={}",
        config.bind_address, config.port, config.max_rooms, config.max_players_per_room, config.bots_per_room
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Initialize shared state
    let registry = RoomRegistry::new(RegistrySettings::from(&config));
    let game_session = Arc::new(RwLock::new(GameSession::new(registry, metrics.clone())));

    // Create WebTransport server
    let server = WebTransportServer::new(config.clone(), game_session.clone(), metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Cleanup: queue kicks, then give writer tasks time to flush them
    game_session.write().await.shutdown("Server shutting down");
    tokio::time::sleep(Duration::from_millis(SHUTDOWN_DRAIN_MS)).await;
    info!("Server stopped");

    Ok(())
}
