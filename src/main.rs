use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use blob_arena_server::config::ServerConfig;
use blob_arena_server::game::session::GameSession;
use blob_arena_server::metrics::{self, Metrics};
use blob_arena_server::net::broadcast::ConnectionSet;
use blob_arena_server::net::game_session::SessionService;
use blob_arena_server::net::transport::ArenaServer;
use blob_arena_server::store::{JsonFileStore, MemoryStore, PersistenceGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Blob Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, arena {}x{}, {} food, win at {}",
        config.bind_address,
        config.port,
        config.game.arena_width,
        config.game.arena_height,
        config.game.food_count,
        config.game.win_score
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_addr = SocketAddr::new(config.bind_address, config.metrics_port);
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    match config.store_path.clone() {
        Some(path) => {
            let store = JsonFileStore::open(&path).await?;
            info!("Player store: {}", store.path().display());
            serve(config, store, metrics).await
        }
        None => {
            info!("Player store: in-memory (set STORE_PATH to persist wins)");
            serve(config, MemoryStore::new(), metrics).await
        }
    }
}

async fn serve<P: PersistenceGateway>(config: ServerConfig, store: P, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let session = GameSession::new(config.game.clone());
    let connections = Arc::new(ConnectionSet::new(config.outbound_queue));
    let service = SessionService::new(session, Arc::new(store), connections, metrics);

    let server = ArenaServer::new(config, service).await?;
    info!("Server ready on https://{}", server.bind_addr());
    info!("Certificate hash: {}", server.cert_hash());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

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

    info!("Server stopped");
    Ok(())
}
