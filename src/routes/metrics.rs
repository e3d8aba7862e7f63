use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::queue::RedisQueue;

#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub queue: Arc<RedisQueue>,
}

/// Prometheus metrics scrape endpoint.
/// Refreshes the response-queue depth gauge before rendering.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.queue.response_depth().await {
        Ok(depth) => metrics::gauge!("analysis_response_queue_depth").set(depth as f64),
        Err(e) => tracing::warn!(error = %e, "Could not read response queue depth"),
    }
    state.handle.render()
}
