//! Streaming CSV export endpoints.
//!
//! Responses stream with chunked transfer; the header row is on the wire
//! before the first cursor fetch completes, and a client disconnect drops
//! the stream, which cancels the database cursor.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use futures::Stream;
use opine_analytics::AnalyticsEngine;
use opine_core::analytics::DateRange;
use opine_db::export::ExportFilters;
use opine_error::Result;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

/// Export route set (mounted under `/api/export`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/export.csv", get(feedback_export))
        .route("/export/topics.csv", get(topics_export))
        .route("/export/analytics.csv", get(analytics_export))
}

fn csv_response<S>(stream: S, filename: &str) -> Response
where
    S: Stream<Item = Result<bytes::Bytes>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct FeedbackExportQuery {
    source: Option<String>,
    customer_id: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    sentiment_min: Option<f64>,
    sentiment_max: Option<f64>,
}

async fn feedback_export(
    State(state): State<AppState>,
    Query(query): Query<FeedbackExportQuery>,
) -> ApiResult<Response> {
    let filters = ExportFilters {
        source: query.source,
        customer_id: query.customer_id,
        start_date: query.start_date,
        end_date: query.end_date,
        sentiment_min: query.sentiment_min,
        sentiment_max: query.sentiment_max,
    };
    let stream = opine_export::feedback_csv(state.pool.clone(), &filters);
    Ok(csv_response(stream, "feedback_export.csv"))
}

#[derive(Debug, Deserialize)]
struct TopicsExportQuery {
    min_feedback_count: Option<i64>,
}

async fn topics_export(
    State(state): State<AppState>,
    Query(query): Query<TopicsExportQuery>,
) -> ApiResult<Response> {
    let stream = opine_export::topics_csv(
        state.pool.clone(),
        query.min_feedback_count.unwrap_or(0).max(0),
    );
    Ok(csv_response(stream, "topics_export.csv"))
}

#[derive(Debug, Deserialize)]
struct AnalyticsExportQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

async fn analytics_export(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsExportQuery>,
) -> ApiResult<Response> {
    let range = DateRange::resolve(query.start_date, query.end_date, AnalyticsEngine::today())?;
    let stream = opine_export::analytics_csv(state.pool.clone(), range.start, range.end);
    Ok(csv_response(stream, "analytics_export.csv"))
}
