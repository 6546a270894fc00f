//! bindrpc - framed JSON-RPC 2.0 facade
//!
//! Listens for length-prefixed JSON-RPC requests and dispatches them to the
//! built-in allow-listed backend classes.

use bindrpc_bridge::builtin;
use bindrpc_server::{run_metrics_server, Config, Metrics, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if BINDRPC_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Ok(path) = std::env::var("BINDRPC_CONFIG") {
        tracing::info!("Loaded config from {}", path);
    }

    tracing::info!("Starting bindrpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  Timeouts: idle {}s, read {}s",
        config.network.idle_timeout_secs,
        config.network.read_timeout_secs
    );
    tracing::info!("  Max frame size: {} bytes", config.network.max_frame_bytes);

    let bridge = Arc::new(builtin::default_registry()?);
    tracing::info!("  Exposed members: {}", bridge.methods().len());

    let mut server_config = ServerConfig::from_config(&config);

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        Some(metrics)
    } else {
        None
    };

    let server = Arc::new(Server::new(server_config, bridge));

    if let Some(metrics) = metrics {
        let addr = config.metrics.bind_addr;
        let shutdown = server.subscribe_shutdown();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    if let Err(e) = server.run().await {
        tracing::error!("Server failed: {}", e);
        return Err(e.into());
    }

    let stats = server.stats();
    tracing::info!(
        "Server stopped ({} connections, {} frames, {} framing errors)",
        stats
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.frames_total.load(std::sync::atomic::Ordering::Relaxed),
        stats
            .framing_errors_total
            .load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
