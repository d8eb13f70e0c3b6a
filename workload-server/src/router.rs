use std::time::Duration;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::instrument;
use workload_common::metrics::{setup_metrics_routes, track_metrics};

use crate::api::{HealthResponse, ProcessError, ProcessRequest, ProcessResponse};
use crate::pipeline::Pipeline;

async fn index() -> &'static str {
    "workload server"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[instrument(skip_all)]
pub async fn process(
    State(pipeline): State<Pipeline>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, ProcessError> {
    let request = ProcessRequest::from_bytes(body)?;
    let result = pipeline.process(request).await?;

    Ok(Json(result.into()))
}

/// Build the service router. Requests running longer than `request_timeout` are answered
/// with 408 and their pipeline future is dropped, handing any pooled connection back.
pub fn router(pipeline: Pipeline, request_timeout: Duration, metrics: bool) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/process", post(process))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(pipeline);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_routes(router.clone()) {
        Ok(router) => router,
        Err(e) => {
            tracing::warn!("failed to install metrics recorder, serving without /metrics: {}", e);
            router
        }
    }
}
