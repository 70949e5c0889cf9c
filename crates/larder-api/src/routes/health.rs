//! Health check endpoint

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/healthcheck
async fn healthcheck() -> Json<HealthResponse> {
    metrics::counter!("larder_health_checks_total").increment(1);

    Json(HealthResponse {
        status: "available",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/healthcheck", get(healthcheck))
}
