//! The dashboard HTTP server: a static page plus a small JSON API over the
//! cached live data and the two assistants.

pub mod handlers;

use crate::adapters::{AirtableClient, OllamaClient, OpenClawRelay, PosthogClient};
use crate::config::toml_config::{expand_path, AppConfig};
use crate::core::live::LiveDataService;
use crate::domain::ports::{ChatBackend, CrmSource, RelayBackend};
use crate::utils::error::{PulseError, Result};
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Shared by every request handler.
pub struct AppState {
    pub live: LiveDataService,
    pub chat: Arc<dyn ChatBackend>,
    pub relay: Arc<dyn RelayBackend>,
    pub dashboard_path: PathBuf,
    pub business_name: String,
    pub business_description: String,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let crm: Option<Arc<dyn CrmSource>> = if config.airtable.is_enabled() {
            Some(Arc::new(AirtableClient::new(&config.airtable)?))
        } else {
            tracing::info!("No Airtable token configured, pipeline data disabled");
            None
        };

        let live = LiveDataService::new(
            Arc::new(PosthogClient::new(&config.posthog)?),
            crm,
            Duration::from_secs(config.server.cache_ttl_seconds),
            config.server.pageview_limit,
        );

        Ok(Self {
            live,
            chat: Arc::new(OllamaClient::new(&config.assistant)?),
            relay: Arc::new(OpenClawRelay::new(&config.assistant)?),
            dashboard_path: expand_path(&config.server.dashboard_path),
            business_name: config.assistant.business_name.clone(),
            business_description: config.assistant.business_description.clone(),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/data", get(handlers::data))
        .route("/api/chat", post(handlers::chat))
        .route("/api/ask-openclaw", post(handlers::ask_openclaw))
        .route("/api/refresh", post(handlers::refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `server.host:server.port` and serves until Ctrl-C.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PulseError::ServerError {
            message: format!("cannot bind {}: {}", addr, e),
        })?;

    tracing::info!(
        "🚀 {} AI Server running at http://localhost:{}",
        config.assistant.business_name,
        config.server.port
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PulseError::ServerError {
            message: e.to_string(),
        })?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
