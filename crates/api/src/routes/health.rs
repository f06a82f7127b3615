use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the ownership store answers.
    pub store_healthy: bool,
    /// Whether the catalog cache answers.
    pub catalog_healthy: bool,
}

/// GET /health -- returns service, store and catalog cache health.
///
/// Responds 503 when either dependency is down so load balancers stop
/// routing to the instance.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.game.health().await;

    let (code, status) = if report.is_healthy() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store_healthy: report.store,
            catalog_healthy: report.catalog,
        }),
    )
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
