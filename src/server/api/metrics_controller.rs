use axum::Extension;
use metrics_exporter_prometheus::PrometheusHandle;

/// prometheus text format of every counter the proxy records
pub async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
