//! weft server
//!
//! Serves the configured root component and the duplex channel its pages
//! connect back on.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weft_server::{
    api::{self, AppState},
    config::Config,
    demo,
    snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SnapshotSweeper},
    Server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to WEFT_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting weft server");
    info!(listen_addr = %config.listen_addr, root_component = %config.root_component, "Configuration loaded");

    let store: Arc<dyn SnapshotStore> = match &config.snapshot_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Persisting snapshots to disk");
            Arc::new(FileSnapshotStore::new(dir.clone()))
        }
        None => Arc::new(MemorySnapshotStore::new()),
    };

    let components = demo::registry()?;
    if !components.contains(&config.root_component) {
        error!(component = %config.root_component, "Root component is not registered");
        anyhow::bail!("unknown root component {:?}", config.root_component);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = SnapshotSweeper::new(store.clone(), config.sweep_interval);
    let sweeper = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let server = Server::builder(components)
        .store(store)
        .options(config.server_options())
        .build();

    let app = api::create_router(AppState {
        server,
        root_component: config.root_component.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        error!(error = %e, "Snapshot sweeper task failed");
    }
    info!("Server shutdown complete");
    Ok(())
}
