//! ==============================================================================
//! main.rs - binhub server entry point
//! ==============================================================================
//!
//! purpose:
//!     the hub that bin sensors report to and dashboards watch.
//!
//! responsibilities:
//!     - load binhub.toml (or defaults) and start logging
//!     - restore the bin registry from the snapshot file
//!     - serve the device / dashboard api and the live event stream
//!     - shut down cleanly on ctrl-c
//!
//! architecture:
//!
//!     ┌──────────────┐  POST /telemetry      ┌─────────────────────────────┐
//!     │  bin sensor  │ ────────────────────▶ │            hub              │
//!     │  (firmware)  │ ◀──────────────────── │  registry -> store -> fanout│
//!     └──────────────┘  GET /config/:id      │        (one mutex)          │
//!                                            └──────┬───────────────▲──────┘
//!                                    GET /events    │               │ PATCH /config
//!                                                   ▼               │
//!                                            ┌─────────────────────────────┐
//!                                            │         dashboards          │
//!                                            └─────────────────────────────┘
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use binhub::broadcast::BroadcastHub;
use binhub::config::HubConfig;
use binhub::persist::{JsonFileStore, MemoryStore, SnapshotStore};
use binhub::{api, Hub};

/// Inventory bin synchronization hub.
#[derive(Parser, Debug)]
#[command(name = "binhub", about = "Inventory bin synchronization hub")]
struct Cli {
    /// Path to binhub.toml (default: config/binhub.toml, ../config/binhub.toml)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(long = "listen")]
    listen: Option<String>,

    /// Keep bin data in memory only
    #[arg(long = "in-memory")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // step 1: configuration, then logging at the configured level
    let (mut config, origin) = HubConfig::resolve(cli.config.as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();
    origin.log();

    if let Some(listen) = cli.listen {
        config.server.bind = listen;
    }
    if cli.in_memory {
        config.storage.in_memory = true;
    }
    config.log_summary();

    // step 2: storage + observer channel
    let store: Arc<dyn SnapshotStore> = if config.storage.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::new(&config.storage.data_file))
    };
    let publisher = Arc::new(BroadcastHub::new(config.broadcast.capacity));

    // step 3: the hub, restored from the last snapshot
    let hub = Hub::new(store, publisher, config.hub_options()).into_shared();
    tracing::info!("[STARTUP] Registry ready with {} bins", hub.lock().await.snapshot().len());

    // step 4: serve
    let static_dir = config.server.static_dir.as_deref().filter(|dir| {
        let exists = dir.is_dir();
        if !exists {
            tracing::warn!("[STARTUP] Dashboard directory {} not found, not serving assets", dir.display());
        }
        exists
    });
    let app = api::router(hub, static_dir);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("[STARTUP] Listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
