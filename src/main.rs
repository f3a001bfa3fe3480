// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::panel_service::PanelRegistry;
use crate::infrastructure::config::load_config;
use crate::infrastructure::logging::init_tracing;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_panel, health_check, list_panels, panel_history, stream_panel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_config()?;
    init_tracing(&config.logging)?;

    // One telemetry sync client per panel (application layer)
    let panels = Arc::new(PanelRegistry::from_config(&config)?);
    if panels.is_empty() {
        tracing::warn!("No panels configured; only /healthz will have content");
    }
    panels.start_all();

    let state = AppState {
        panels: panels.clone(),
    };

    // Build router (presentation layer)
    // Compression is handled in the response builders, so no CompressionLayer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/panels", get(list_panels))
        .route("/panels/:id", get(get_panel))
        .route("/panels/:id/history", get(panel_history))
        .route("/panels/:id/stream", get(stream_panel))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await?;
    tracing::info!("Starting machine-telemetry service on {}", listener.local_addr()?);

    // Stopping the panels ends every open stream, which lets shutdown finish
    let shutdown_panels = panels.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            shutdown_panels.stop_all();
        })
        .await?;

    panels.stop_all();
    Ok(())
}
