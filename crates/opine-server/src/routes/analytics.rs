//! Analytics rollup endpoints.
//!
//! Handlers decode declarative parameter schemas, hand resolved parameters
//! to the cache-through engine, and return the engine's serialized bytes
//! verbatim so identical requests are byte-identical within the TTL.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use opine_analytics::AnalyticsEngine;
use opine_core::analytics::{
    CustomerStatsParams, DailyAggregateParams, DashboardParams, DateRange, ExamplesParams,
    GroupBy, SourceStatsParams, SummaryParams, TopicsParams, ToxicityParams, TrendParams,
};
use opine_core::Sentiment;
use opine_error::OpineError;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// The rollup route set (mounted under both `/analytics` and `/api`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sentiment-trends", get(sentiment_trends))
        .route("/volume-trends", get(volume_trends))
        .route("/daily-aggregates", get(daily_aggregates))
        .route("/customers", get(customers))
        .route("/sources", get(sources))
        .route("/toxicity", get(toxicity))
        .route("/summary", get(summary))
        .route("/topics", get(topics))
        .route("/examples", get(examples))
        .route("/dashboard/summary", get(dashboard_summary))
}

/// Resolve date-window query parameters (`start`/`end` accepted as
/// aliases of `start_date`/`end_date`).
fn resolve_range(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateRange, OpineError> {
    DateRange::resolve(start_date.or(start), end_date.or(end), AnalyticsEngine::today())
}

/// Common date-window query parameters.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl RangeQuery {
    fn resolve(&self) -> Result<DateRange, OpineError> {
        resolve_range(self.start_date, self.end_date, self.start, self.end)
    }
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    group_by: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl TrendQuery {
    fn resolve(&self) -> Result<DateRange, OpineError> {
        resolve_range(self.start_date, self.end_date, self.start, self.end)
    }
}

#[derive(Debug, Deserialize)]
struct DailyQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DailyQuery {
    fn resolve(&self) -> Result<DateRange, OpineError> {
        resolve_range(self.start_date, self.end_date, self.start, self.end)
    }
}

#[derive(Debug, Deserialize)]
struct CustomersQuery {
    min_feedback_count: Option<u32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl CustomersQuery {
    fn resolve(&self) -> Result<DateRange, OpineError> {
        resolve_range(self.start_date, self.end_date, self.start, self.end)
    }
}

#[derive(Debug, Deserialize)]
struct ToxicityQuery {
    threshold: Option<f64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl ToxicityQuery {
    fn resolve(&self) -> Result<DateRange, OpineError> {
        resolve_range(self.start_date, self.end_date, self.start, self.end)
    }
}

#[derive(Debug, Deserialize)]
struct ExamplesQuery {
    topic_id: Option<i64>,
    sentiment: Option<i16>,
    limit: Option<u32>,
}

fn json_bytes(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        bytes,
    )
        .into_response()
}

async fn sentiment_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Response> {
    let params = TrendParams {
        group_by: GroupBy::parse(query.group_by.as_deref())?,
        range:    query.resolve()?,
    };
    Ok(json_bytes(state.analytics.sentiment_trends(params).await?))
}

async fn volume_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Response> {
    let params = TrendParams {
        group_by: GroupBy::parse(query.group_by.as_deref())?,
        range:    query.resolve()?,
    };
    Ok(json_bytes(state.analytics.volume_trends(params).await?))
}

async fn daily_aggregates(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> ApiResult<Response> {
    let params =
        DailyAggregateParams::new(query.resolve()?, query.page, query.page_size)?;
    Ok(json_bytes(state.analytics.daily_aggregates(params).await?))
}

async fn customers(
    State(state): State<AppState>,
    Query(query): Query<CustomersQuery>,
) -> ApiResult<Response> {
    let params = CustomerStatsParams {
        min_feedback_count: query.min_feedback_count.unwrap_or(1),
        range:              query.resolve()?,
    };
    Ok(json_bytes(state.analytics.customers(params).await?))
}

async fn sources(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let params = SourceStatsParams {
        range: query.resolve()?,
    };
    Ok(json_bytes(state.analytics.sources(params).await?))
}

async fn toxicity(
    State(state): State<AppState>,
    Query(query): Query<ToxicityQuery>,
) -> ApiResult<Response> {
    let params = ToxicityParams::new(query.threshold, query.resolve()?)?;
    Ok(json_bytes(state.analytics.toxicity(params).await?))
}

async fn summary(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let params = SummaryParams {
        range: query.resolve()?,
    };
    Ok(json_bytes(state.analytics.summary(params).await?))
}

async fn topics(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let params = TopicsParams {
        range: query.resolve()?,
    };
    Ok(json_bytes(state.analytics.topics(params).await?))
}

async fn examples(
    State(state): State<AppState>,
    Query(query): Query<ExamplesQuery>,
) -> ApiResult<Response> {
    let sentiment = query.sentiment.map(Sentiment::from_i16).transpose()?;
    let params = ExamplesParams::new(query.topic_id, sentiment, query.limit)?;
    Ok(json_bytes(state.analytics.examples(params).await?))
}

async fn dashboard_summary(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Response> {
    let params = DashboardParams {
        range: query.resolve()?,
    };
    Ok(json_bytes(state.analytics.dashboard_summary(params).await?))
}

/// Feedback detail joined with its live annotation.
pub async fn feedback_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let feedback = state
        .feedback
        .get(id)
        .await?
        .ok_or_else(|| OpineError::not_found("Feedback", id.to_string()))?;
    let annotation = state.annotations.get_for_feedback(id).await?;

    Ok(Json(json!({
        "id": feedback.id,
        "source": feedback.source,
        "customer_id": feedback.customer_id,
        "body": feedback.body,
        "language": feedback.language,
        "metadata": feedback.metadata,
        "created_at": feedback.created_at,
        "annotation": annotation,
    }))
    .into_response())
}
