use axum::Extension;
use axum::Json;
use chrono::Utc;

use crate::server::dtos::health_dto::{HealthResponse, HealthStatus};
use crate::server::services::ProxyServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// liveness only. the proxy holds no connections of its own worth checking, an upstream being
/// down is that request's problem, not ours
pub async fn health_endpoint(
    Extension(services): Extension<ProxyServices>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
    })
}
