use std::sync::Arc;

use tracing::info;

use parley_server::app;
use parley_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&config.db_path)?);

    let (router, presence) = app::build(db, &config.jwt_secret);

    info!("Parley server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(presence))
        .await?;

    info!("Parley server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, closing every gateway connection first so the
/// WebSocket tasks can finish.
async fn shutdown_signal(presence: parley_gateway::presence::PresenceRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
    presence.shutdown().await;
}
