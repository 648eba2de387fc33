//! Health checks and the development metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// System routes. The metrics route is mounted only when enabled
/// (development deployments).
pub fn routes(state: &AppState) -> Router<AppState> {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz));
    if state.config.metrics_enabled {
        router = router.route("/metrics", get(metrics));
    }
    router
}

/// Liveness plus a database probe.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match opine_db::health_check(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "detail": e.to_string() })),
        ),
    }
}

/// Bare liveness probe.
async fn healthz() -> &'static str {
    "ok"
}

/// Prometheus text exposition.
async fn metrics() -> impl IntoResponse {
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}
