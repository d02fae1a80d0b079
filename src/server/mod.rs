pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use api::{
    ProxyController, health_controller::health_endpoint, metrics_controller::metrics_endpoint,
};
use services::ProxyServices;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// every route except /metrics, which needs the global recorder and is bolted on in serve
pub fn build_router(services: ProxyServices) -> Router {
    let proxy_path = services.config.normalized_proxy_path();

    Router::new()
        .route("/health", get(health_endpoint))
        .merge(ProxyController::app(&proxy_path))
        .layer(Extension(services))
        .layer(TraceLayer::new_for_http())
}

pub struct ProxyApplicationServer;

impl ProxyApplicationServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&STARTED_AT);

        let services = ProxyServices::new(config.clone())?;

        let metrics = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install prometheus recorder")?;

        let app = build_router(services)
            .route("/metrics", get(metrics_endpoint))
            .layer(Extension(metrics));

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("Failed to bind port {}", config.port))?;

        let addr = listener
            .local_addr()
            .context("listener has no local address")?;
        info!(
            "proxy listening on {} at {}",
            addr,
            config.normalized_proxy_path()
        );

        // a dropped client drops the handler future, which cancels the upstream request with it
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("proxy shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
