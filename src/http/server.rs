//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and shut down gracefully
//! - Hold the swappable negotiation pipeline shared by handlers

use axum::{routing::get, Router};
use arc_swap::ArcSwap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigError, ServerConfig};
use crate::http::handlers::{echo, health, index, media};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::negotiation::Pipeline;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ArcSwap<Pipeline>>,
    media_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, media_root: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: Arc::new(ArcSwap::from_pointee(pipeline)),
            media_root: Arc::new(media_root.into()),
        }
    }

    /// Snapshot of the current pipeline; a reload does not affect it.
    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.load_full()
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Rebuild the pipeline from a new configuration and swap it in.
    pub fn reload(&self, config: &ServerConfig) -> Result<(), ConfigError> {
        let pipeline = Pipeline::from_config(config)?;
        self.pipeline.store(Arc::new(pipeline));
        tracing::info!(
            representation_policy = ?config.representation.policy,
            compression_policy = ?config.compression.policy,
            compression_level = config.compression.level,
            "Negotiation pipeline reloaded"
        );
        Ok(())
    }
}

/// HTTP server fronting the negotiation pipeline.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        let pipeline = Pipeline::from_config(&config)?;
        let state = AppState::new(pipeline, &config.media.root);
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/api/echo", get(echo))
            .route("/media/{*path}", get(media))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Router with all layers, for serving or driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Shared state, used to apply configuration reloads.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            media_root = %self.state.media_root().display(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
