//! Ingestion endpoints: single, bulk, and streaming uploads.

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use opine_core::model::NewFeedback;
use opine_error::OpineError;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Ingestion route set.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feedback", post(create_feedback))
        .route("/feedback/batch", post(create_batch))
        .route("/upload/csv", post(upload_csv))
        .route("/upload/json", post(upload_jsonl))
        .route("/batches/{id}", get(batch_status))
}

async fn create_feedback(
    State(state): State<AppState>,
    Json(submission): Json<NewFeedback>,
) -> ApiResult<impl IntoResponse> {
    let id = state.ingest.create_one(submission).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn create_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<NewFeedback>>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.ingest.create_batch(items).await?;
    Ok(Json(json!({
        "batch_id": outcome.batch_id,
        "job_id": outcome.job_id,
        "outcomes": outcome.outcomes,
    })))
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    source: Option<String>,
}

/// Bridge a multipart field into the static byte stream the pipeline
/// consumes, forwarding chunks as they arrive.
async fn run_streaming_upload<F, Fut>(
    mut field: Field<'_>,
    run: F,
) -> Result<opine_ingest::UploadOutcome, ApiError>
where
    F: FnOnce(
        std::pin::Pin<Box<dyn futures::Stream<Item = std::io::Result<Bytes>> + Send>>,
    ) -> Fut,
    Fut: std::future::Future<Output = Result<opine_ingest::UploadOutcome, OpineError>>,
{
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(16);
    let stream = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    let feeder = async {
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(std::io::Error::other(e))).await;
                    break;
                },
            }
        }
        drop(tx);
    };

    let (outcome, ()) = tokio::join!(run(stream), feeder);
    outcome.map_err(ApiError)
}

/// Upload format selector shared by the two upload handlers.
#[derive(Clone, Copy)]
enum UploadFormat {
    Csv,
    Jsonl,
}

/// Walk the multipart body: record a `source` form field when it precedes
/// the file, then stream the file part into the pipeline. Fields stream in
/// order, so a trailing source field cannot be honoured without buffering
/// the file; `source` may also come as a query parameter.
async fn handle_upload(
    state: &AppState,
    mut multipart: Multipart,
    mut source: Option<String>,
    format: UploadFormat,
) -> Result<opine_ingest::UploadOutcome, ApiError> {
    loop {
        let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| OpineError::validation(format!("malformed multipart body: {e}")))?
        else {
            return Err(ApiError(OpineError::validation("multipart body has no file field")));
        };

        match field.name() {
            Some("source") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| OpineError::validation(format!("unreadable source field: {e}")))?;
                source = Some(value);
            },
            Some("file") | None => {
                let source = source
                    .ok_or_else(|| OpineError::validation_field("source is required", "source"))?;
                let ingest = state.ingest.clone();
                return run_streaming_upload(field, |stream| async move {
                    match format {
                        UploadFormat::Csv => ingest.upload_csv(&source, stream).await,
                        UploadFormat::Jsonl => ingest.upload_jsonl(&source, stream).await,
                    }
                })
                .await;
            },
            Some(_) => {
                // Unknown fields are skipped.
            },
        }
    }
}

async fn upload_csv(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let outcome = handle_upload(&state, multipart, query.source, UploadFormat::Csv).await?;
    Ok(upload_response(&outcome))
}

async fn upload_jsonl(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let outcome = handle_upload(&state, multipart, query.source, UploadFormat::Jsonl).await?;
    Ok(upload_response(&outcome))
}

fn upload_response(outcome: &opine_ingest::UploadOutcome) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({
            "batch_id": outcome.batch_id,
            "job_id": outcome.job_id,
            "processed_count": outcome.counters.processed_count,
            "created_count": outcome.counters.created_count,
            "duplicate_count": outcome.counters.duplicate_count,
            "error_count": outcome.counters.error_count,
            "skipped_non_english_count": outcome.counters.skipped_non_english_count,
        })),
    )
}

/// Batch status for upload observability.
async fn batch_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let batch = state
        .batches
        .get(id)
        .await?
        .ok_or_else(|| OpineError::not_found("Batch", id.to_string()))?;
    Ok(Json(batch))
}
