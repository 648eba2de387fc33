//! The three export variants and their row mappings.

use chrono::{DateTime, NaiveDate, Utc};
use futures::Stream;
use opine_db::export::{
    analytics_export_query, feedback_export_query, stream_rows, topics_export_query,
    ExportFilters, DEFAULT_CHUNK_ROWS,
};
use opine_db::Pool;
use opine_error::Result;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::encode::csv_byte_stream;

/// Feedback export columns.
pub const FEEDBACK_HEADER: &[&str] = &[
    "id",
    "text",
    "source",
    "customer_id",
    "sentiment_score",
    "created_at",
    "updated_at",
    "primary_topic",
    "topic_keywords",
];

/// Topics export columns.
pub const TOPICS_HEADER: &[&str] = &[
    "id",
    "label",
    "keywords",
    "created_at",
    "updated_at",
    "feedback_count",
    "avg_sentiment",
];

/// Daily-aggregate export columns.
pub const ANALYTICS_HEADER: &[&str] = &[
    "date",
    "total_feedback",
    "positive_feedback",
    "negative_feedback",
    "neutral_feedback",
    "avg_sentiment",
    "unique_customers",
    "top_sources",
];

/// Streaming feedback export joined with the current annotation and topic.
#[must_use]
pub fn feedback_csv(
    pool: Pool,
    filters: &ExportFilters,
) -> impl Stream<Item = Result<bytes::Bytes>> + Send {
    let (sql, params) = feedback_export_query(filters);
    let chunks = row_chunks(pool, sql, params, feedback_row_to_record);
    csv_byte_stream(FEEDBACK_HEADER, chunks)
}

/// Streaming topics export with aggregate counts.
#[must_use]
pub fn topics_csv(
    pool: Pool,
    min_feedback_count: i64,
) -> impl Stream<Item = Result<bytes::Bytes>> + Send {
    let (sql, params) = topics_export_query(min_feedback_count);
    let chunks = row_chunks(pool, sql, params, topic_row_to_record);
    csv_byte_stream(TOPICS_HEADER, chunks)
}

/// Streaming daily-aggregate export from the materialised view.
#[must_use]
pub fn analytics_csv(
    pool: Pool,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Stream<Item = Result<bytes::Bytes>> + Send {
    let (sql, params) = analytics_export_query(start, end);
    let chunks = row_chunks(pool, sql, params, analytics_row_to_record);
    csv_byte_stream(ANALYTICS_HEADER, chunks)
}

/// Bridge the cursor channel into a stream of mapped record batches.
fn row_chunks(
    pool: Pool,
    sql: String,
    params: Vec<opine_db::export::SqlValue>,
    map: fn(&Row) -> Vec<String>,
) -> impl Stream<Item = Result<Vec<Vec<String>>>> + Send + 'static {
    let rx = stream_rows(pool, sql, params, DEFAULT_CHUNK_ROWS);
    futures::stream::unfold(rx, move |mut rx| async move {
        let item = rx.recv().await?;
        let mapped = item.map(|rows| rows.iter().map(map).collect());
        Some((mapped, rx))
    })
}

fn feedback_row_to_record(row: &Row) -> Vec<String> {
    let id: Uuid = row.get("id");
    let sentiment_score: Option<f64> = row.get("sentiment_score");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: Option<DateTime<Utc>> = row.get("updated_at");
    let primary_topic: Option<String> = row.get("primary_topic");
    let topic_keywords: Option<Vec<String>> = row.get("topic_keywords");

    vec![
        id.to_string(),
        row.get::<_, String>("body"),
        row.get::<_, String>("source"),
        row.get::<_, Option<String>>("customer_id").unwrap_or_default(),
        sentiment_score.map(|s| s.to_string()).unwrap_or_default(),
        created_at.to_rfc3339(),
        updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        primary_topic.unwrap_or_default(),
        topic_keywords.map(|k| k.join(";")).unwrap_or_default(),
    ]
}

fn topic_row_to_record(row: &Row) -> Vec<String> {
    let id: i64 = row.get("id");
    let keywords: Vec<String> = row.get("keywords");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");
    let feedback_count: i64 = row.get("feedback_count");
    let avg_sentiment: Option<f64> = row.get("avg_sentiment");

    vec![
        id.to_string(),
        row.get::<_, String>("label"),
        keywords.join(";"),
        created_at.to_rfc3339(),
        updated_at.to_rfc3339(),
        feedback_count.to_string(),
        avg_sentiment.map(|s| s.to_string()).unwrap_or_default(),
    ]
}

fn analytics_row_to_record(row: &Row) -> Vec<String> {
    let day: NaiveDate = row.get("day");
    let avg_sentiment: Option<f64> = row.get("avg_sentiment");
    let top_sources: Vec<String> = row.get("top_sources");

    vec![
        day.to_string(),
        row.get::<_, i64>("total_feedback").to_string(),
        row.get::<_, i64>("positive_feedback").to_string(),
        row.get::<_, i64>("negative_feedback").to_string(),
        row.get::<_, i64>("neutral_feedback").to_string(),
        avg_sentiment.map(|s| s.to_string()).unwrap_or_default(),
        row.get::<_, i64>("unique_customers").to_string(),
        top_sources.join(";"),
    ]
}
