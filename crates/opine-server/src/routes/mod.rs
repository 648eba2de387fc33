//! Route assembly.
//!
//! `/analytics/*` is the canonical analytics prefix; `/api/*` mounts the
//! same handlers as a compatibility alias and additionally carries the
//! feedback detail lookup and the export endpoints.

pub mod admin;
pub mod analytics;
pub mod chat;
pub mod export;
pub mod ingest;
pub mod system;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the full route tree with state applied.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(system::routes(&state))
        .nest("/ingest", ingest::routes())
        .nest("/analytics", analytics::routes())
        .nest("/chat", chat::routes())
        .nest("/admin", admin::routes())
        .nest("/api", api_alias())
        .with_state(state)
}

/// The `/api` compatibility alias plus api-only endpoints.
fn api_alias() -> Router<AppState> {
    analytics::routes()
        .route("/feedback/{id}", get(analytics::feedback_detail))
        .nest("/export", export::routes())
}
