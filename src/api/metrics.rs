//! `GET /metrics`
//!
//! Prometheus text exposition of the federation instruments in
//! [`crate::metrics`]: signature verifications, inbound and outbound
//! federation requests, profile cache hits and received activities.

use axum::{
    Router,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::error::AppError;

/// Metrics router; stateless, so it merges into any router
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(render_metrics))
}

async fn render_metrics() -> Result<Response, AppError> {
    let text = crate::metrics::gather_text().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode federation metrics");
        AppError::Internal(anyhow::anyhow!("metrics encoding: {}", e))
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response())
}
