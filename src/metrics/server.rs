use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, response::IntoResponse, routing::get};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{error, info};

use crate::metrics::Metrics;

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    let app = router(metrics);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting metrics server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

// The gauge is refreshed at the start of every publish tick, so a connection
// lost between ticks shows up here after at most one publish interval.
async fn health_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    if metrics.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "broken")
    }
}
