//! Admin surface: logins, stats, maintenance, and the audited mutations.
//!
//! Read endpoints accept viewer tokens; mutations require the admin role.
//! After a mutation commits, the handler deletes the analytics cache
//! prefix and refreshes the materialised view, in that order.

use axum::extract::{Path, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use opine_auth::{verify_credentials, Role};
use opine_core::analytics::ANALYTICS_KEY_PREFIX;
use opine_db::audit::ActorInfo;
use opine_db::matview;
use opine_error::OpineError;
use opine_queue::QueueName;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extractors::{ClientIp, RequireAdmin, RequireViewer};
use crate::state::AppState;

/// Admin route set.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(admin_login))
        .route("/viewer/login", post(viewer_login))
        .route("/stats", get(stats))
        .route("/health/database", get(database_health))
        .route("/maintenance/refresh-materialized-view", post(refresh_matview))
        .route("/topics", get(list_topics))
        .route("/relabel-topic", post(relabel_topic))
        .route("/reassign-feedback", post(reassign_feedback))
        .route("/topics/{id}/feedback", get(topic_feedback))
        .route("/topic-audit", get(topic_audit_all))
        .route("/topic-audit/{topic_id}", get(topic_audit_one))
        .route("/cleanup/old-data", post(cleanup_old_data))
        .route("/cache/clear", post(clear_cache))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

fn login_response(state: &AppState, subject: &str, role: Role) -> ApiResult<impl IntoResponse> {
    let token = state.tokens.issue(subject, role)?;
    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": state.tokens.lifetime_secs(),
        "role": role.as_str(),
    })))
}

async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if !verify_credentials(&state.config.admin, &request.username, &request.password) {
        return Err(OpineError::auth_missing("invalid credentials").into());
    }
    login_response(&state, &request.username, Role::Admin)
}

async fn viewer_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if !verify_credentials(&state.config.viewer, &request.username, &request.password) {
        return Err(OpineError::auth_missing("invalid credentials").into());
    }
    login_response(&state, &request.username, Role::Viewer)
}

async fn stats(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let feedback_count = state.feedback.count_total().await?;
    let annotation_count = state.annotations.count_total().await?;
    let topic_count = state.topics.count_total().await?;

    let mut queues = serde_json::Map::new();
    for queue in QueueName::ALL {
        let depth = state.queue.queue_depth(queue).await.unwrap_or(0);
        let dlq = state.queue.dlq_size(queue).await.unwrap_or(0);
        queues.insert(
            queue.as_str().to_string(),
            json!({ "pending": depth, "dead_lettered": dlq }),
        );
    }

    let pool = opine_db::pool::stats(&state.pool);
    Ok(Json(json!({
        "feedback_count": feedback_count,
        "annotation_count": annotation_count,
        "topic_count": topic_count,
        "queues": queues,
        "pool": { "active": pool.active, "idle": pool.idle, "max_size": pool.max_size },
    })))
}

async fn database_health(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    opine_db::health_check(&state.pool).await?;
    let pool = opine_db::pool::stats(&state.pool);
    Ok(Json(json!({
        "connected": true,
        "active_connections": pool.active,
        "idle_connections": pool.idle,
        "max_size": pool.max_size,
    })))
}

async fn refresh_matview(
    RequireAdmin(_claims): RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    matview::refresh_daily_aggregates(&state.pool).await?;
    Ok(Json(json!({ "refreshed": true })))
}

async fn list_topics(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let topics = state.topics.list().await?;
    Ok(Json(topics))
}

fn actor_info(claims: &opine_auth::Claims, ip: Option<String>, headers: &HeaderMap) -> ActorInfo {
    ActorInfo {
        actor: claims.sub.clone(),
        ip,
        agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
    }
}

/// Post-commit bookkeeping shared by all mutations: cache invalidation,
/// then the materialised-view refresh.
async fn after_mutation(state: &AppState) -> ApiResult<()> {
    state.cache.delete_prefix(ANALYTICS_KEY_PREFIX).await;
    matview::refresh_daily_aggregates(&state.pool).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RelabelRequest {
    topic_id: i64,
    new_label: String,
    new_keywords: Vec<String>,
}

async fn relabel_topic(
    RequireAdmin(claims): RequireAdmin,
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<RelabelRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.new_label.trim().is_empty() {
        return Err(OpineError::validation_field("new_label must not be empty", "new_label").into());
    }

    let actor = actor_info(&claims, client_ip, &headers);
    let outcome = state
        .admin
        .relabel_topic(request.topic_id, &request.new_label, &request.new_keywords, &actor)
        .await?;
    after_mutation(&state).await?;

    Ok(Json(json!({
        "topic": outcome.topic,
        "audit_id": outcome.audit_id,
    })))
}

#[derive(Debug, Deserialize)]
struct ReassignRequest {
    feedback_ids: Vec<Uuid>,
    target_topic_id: i64,
    reason: Option<String>,
}

async fn reassign_feedback(
    RequireAdmin(claims): RequireAdmin,
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<ReassignRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_info(&claims, client_ip, &headers);
    let reassigned = state
        .admin
        .reassign_feedback(
            &request.feedback_ids,
            request.target_topic_id,
            request.reason.as_deref(),
            &actor,
        )
        .await?;
    after_mutation(&state).await?;

    Ok(Json(json!({
        "reassigned": reassigned,
        "target_topic_id": request.target_topic_id,
    })))
}

#[derive(Debug, Deserialize)]
struct TopicFeedbackQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn topic_feedback(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<TopicFeedbackQuery>,
) -> ApiResult<impl IntoResponse> {
    if state.topics.get(id).await?.is_none() {
        return Err(OpineError::not_found("Topic", id.to_string()).into());
    }
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let result = state.store.feedback_for_topic(id, page, page_size).await?;
    Ok(Json(result))
}

const AUDIT_PAGE_LIMIT: i64 = 100;

async fn topic_audit_all(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let entries = state.audit.list(None, AUDIT_PAGE_LIMIT).await?;
    Ok(Json(entries))
}

async fn topic_audit_one(
    RequireViewer(_claims): RequireViewer,
    State(state): State<AppState>,
    Path(topic_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let entries = state.audit.list(Some(topic_id), AUDIT_PAGE_LIMIT).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    days_old: i64,
    #[serde(default)]
    dry_run: bool,
}

async fn cleanup_old_data(
    RequireAdmin(claims): RequireAdmin,
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    Json(request): Json<CleanupRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_info(&claims, client_ip, &headers);
    let affected = state
        .admin
        .cleanup_old_data(request.days_old, request.dry_run, &actor)
        .await?;
    if !request.dry_run && affected > 0 {
        after_mutation(&state).await?;
    }
    Ok(Json(json!({
        "affected": affected,
        "dry_run": request.dry_run,
    })))
}

async fn clear_cache(
    RequireAdmin(_claims): RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.cache.delete_prefix("").await;
    Ok(Json(json!({ "cleared": true })))
}
