// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_service::ChartService;
use crate::application::dashboard_stream::DashboardStreamService;
use crate::infrastructure::config::{load_panels_config, load_service_config};
use crate::infrastructure::http_metrics_repository::HttpMetricsRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, legend_action, list_panels, panel_chart, stream_dashboard, tooltip,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let service_config = load_service_config()?;
    let panels_config = load_panels_config()?;
    let offset = FixedOffset::east_opt(service_config.server.utc_offset_minutes * 60)
        .context("utc_offset_minutes is out of range")?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(HttpMetricsRepository::new(
        service_config.upstream.host,
        service_config.upstream.token,
        service_config.upstream.api_path,
        Duration::from_secs(service_config.upstream.timeout_secs),
    )?);

    // Create services (application layer)
    let chart_service = ChartService::new(repository, Arc::new(panels_config), offset)
        .with_retained_charts(service_config.server.retained_charts);
    let stream_service = DashboardStreamService::new(chart_service.clone());

    // Create application state
    let state = Arc::new(AppState {
        chart_service,
        stream_service,
    });

    // Build router (presentation layer)
    // Responses are compressed by the handlers, so no CompressionLayer here.
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/panels", get(list_panels))
        .route("/panels/:id/chart", get(panel_chart))
        .route("/panels/:id/legend", post(legend_action))
        .route("/panels/:id/tooltip", post(tooltip))
        .route("/dashboards/:id/stream", get(stream_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = service_config
        .server
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", service_config.server.listen))?;
    tracing::info!("Starting metrics-chart service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
