//! Grounded QA endpoints.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use opine_core::analytics::{cache_key, Endpoint};
use opine_qa::suggestions::build_suggestions;
use opine_qa::QaRequest;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::ApiResult;
use crate::state::AppState;

/// Suggestions cache TTL.
const SUGGESTIONS_TTL: Duration = Duration::from_secs(300);

/// Chat route set.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/query", post(query))
        .route("/conversations", get(conversations))
        .route("/clear-memory", post(clear_memory))
        .route("/suggestions", get(suggestions))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QaRequest>,
) -> ApiResult<impl IntoResponse> {
    let question = request.question.clone();
    let filters_json = request
        .filters
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(opine_error::OpineError::from)?;

    let response = state.qa.ask(request).await?;

    // History is best-effort; losing one row must not fail the answer.
    let citations = serde_json::to_value(&response.citations).unwrap_or_else(|_| json!([]));
    if let Err(e) = state
        .conversations
        .insert(&question, &response.answer, &citations, filters_json.as_ref())
        .await
    {
        warn!(error = %e, "failed to persist conversation");
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<i64>,
    page_size: Option<i64>,
}

async fn conversations(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let (items, total) = state.conversations.list(page, page_size).await?;

    Ok(Json(json!({
        "items": items.iter().map(|row| json!({
            "id": row.id,
            "question": row.question,
            "answer": row.answer,
            "citations": row.citations,
            "filters": row.filters,
            "created_at": row.created_at,
        })).collect::<Vec<_>>(),
        "page": page,
        "page_size": page_size,
        "total": total,
    })))
}

async fn clear_memory(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let cleared = state.conversations.clear().await?;
    Ok(Json(json!({ "cleared": cleared })))
}

async fn suggestions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let key = cache_key(Endpoint::Suggestions, "v1");
    if let Some(cached) = state.cache.get(&key).await {
        if let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&cached) {
            return Ok(Json(payload));
        }
    }

    let labels: Vec<String> = state
        .topics
        .list()
        .await?
        .into_iter()
        .map(|topic| topic.label)
        .collect();
    let payload = serde_json::to_value(build_suggestions(&labels))
        .map_err(opine_error::OpineError::from)?;
    state
        .cache
        .set_ttl(&key, &serde_json::to_vec(&payload).map_err(opine_error::OpineError::from)?, SUGGESTIONS_TTL)
        .await;
    Ok(Json(payload))
}
