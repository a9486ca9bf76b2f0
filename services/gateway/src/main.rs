use std::sync::Arc;

use gateway::{AppState, Background, GatewayConfig, create_router};
use persistence::MemoryStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Gateway service");

    let config = GatewayConfig::from_env()?;
    let store = Arc::new(MemoryStore::new());
    let (state, background) = AppState::build(&config, store).await?;
    let Background {
        source,
        commands,
        ticks,
        scheduler,
    } = background;

    let feed = tokio::spawn(source.run(commands));
    let matcher = tokio::spawn(state.engine.clone().run(ticks));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = tokio::spawn(scheduler.run(shutdown_rx));

    let app = create_router(state);
    let listener = TcpListener::bind(config.bind_addr).await?;

    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Let a running sweep finish; the feed and matcher hold no state worth draining
    let _ = shutdown_tx.send(true);
    if let Err(err) = jobs.await {
        tracing::warn!(error = %err, "Scheduler task ended abnormally");
    }
    feed.abort();
    matcher.abort();

    tracing::info!("Gateway stopped");
    Ok(())
}
