//! Response negotiation server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────────▶ http server ──▶ handler ──▶ Content
//!                                                      │
//!                                                      ▼
//!                                      ┌─────────────────────────────┐
//!                                      │  RepresentationSelector     │
//!                                      │  (Accept)                   │──── video/mp4 ───▶ sink
//!                                      └──────────────┬──────────────┘                   │
//!                                                     │ body                             │
//!                                                     ▼                                  │
//!                                      ┌─────────────────────────────┐                   │
//!                                      │  CompressionSelector        │                   │
//!                                      │  (Accept-Encoding)          │                   │
//!                                      └──────────────┬──────────────┘                   │
//!     Client Response                                 │                                  │
//!     ◀───────────────────────────────────────────────┴──────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use response_pipeline::config::{load_config, watcher::ConfigWatcher, ServerConfig};
use response_pipeline::lifecycle::{signals::shutdown_signal, Shutdown};
use response_pipeline::observability;
use response_pipeline::HttpServer;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "response-pipeline")]
#[command(
    about = "HTTP server with Accept / Accept-Encoding response negotiation",
    long_about = None
)]
struct Cli {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    observability::logging::init(&config.observability);
    tracing::info!("response-pipeline v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        representation_policy = ?config.representation.policy,
        compression_policy = ?config.compression.policy,
        compression_level = config.compression.level,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let state = server.state().clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(new_config) = updates.recv() => {
                            if let Err(e) = state.reload(&new_config) {
                                tracing::error!(error = %e, "Rejected reloaded configuration");
                            }
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(watcher.run()?)
        }
        None => None,
    };

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown.notified()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
