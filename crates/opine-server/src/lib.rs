//! HTTP surface for Opine.
//!
//! Middleware chain, outer to inner: request-id assignment, request
//! timing/trace, CORS, rate limiting, then routing; authentication is
//! applied per route through extractors, and this crate is the single
//! point where errors serialise to HTTP.

pub mod error;
pub mod extractors;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assemble the full application router.
#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = middleware::cors::cors_layer(&state.config.cors_origins);

    routes::router(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
}
