//! Server-side cursor streaming for exports.
//!
//! Each export opens a transaction, binds a portal, and fetches rows in
//! chunks through a bounded channel. The channel is the backpressure
//! boundary: the fetch task only pulls the next chunk once the consumer
//! has drained the previous one. Dropping the receiver (client
//! disconnect) aborts the task, rolling the transaction back and
//! releasing the connection.

use chrono::NaiveDate;
use deadpool_postgres::Pool;
use opine_error::Result;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

use crate::error::{classify_pg_error, classify_pool_error};

/// Rows fetched per portal round-trip.
pub const DEFAULT_CHUNK_ROWS: i32 = 500;

/// Owned SQL parameter for queries built ahead of the fetch task.
#[derive(Debug, Clone)]
pub enum SqlValue {
    /// TEXT parameter.
    Text(String),
    /// DATE parameter.
    Date(NaiveDate),
    /// BIGINT parameter.
    Int(i64),
    /// FLOAT8 parameter.
    Float(f64),
}

impl SqlValue {
    fn as_dyn(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Text(v) => v,
            Self::Date(v) => v,
            Self::Int(v) => v,
            Self::Float(v) => v,
        }
    }
}

/// Filters accepted by the feedback export.
#[derive(Debug, Clone, Default)]
pub struct ExportFilters {
    /// Restrict to one source tag.
    pub source: Option<String>,
    /// Restrict to one customer.
    pub customer_id: Option<String>,
    /// Inclusive start date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive end date.
    pub end_date: Option<NaiveDate>,
    /// Minimum sentiment score.
    pub sentiment_min: Option<f64>,
    /// Maximum sentiment score.
    pub sentiment_max: Option<f64>,
}

/// Spawn a fetch task streaming `sql` results in chunks.
///
/// The receiver yields row chunks; an `Err` item reports the failure that
/// ended the stream early.
#[must_use]
pub fn stream_rows(
    pool: Pool,
    sql: String,
    params: Vec<SqlValue>,
    chunk_rows: i32,
) -> mpsc::Receiver<Result<Vec<Row>>> {
    let (tx, rx) = mpsc::channel::<Result<Vec<Row>>>(4);

    tokio::spawn(async move {
        let outcome = fetch_loop(&pool, &sql, &params, chunk_rows, &tx).await;
        if let Err(e) = outcome {
            // Receiver may already be gone; nothing more to do then.
            let _ = tx.send(Err(e)).await;
        }
    });

    rx
}

async fn fetch_loop(
    pool: &Pool,
    sql: &str,
    params: &[SqlValue],
    chunk_rows: i32,
    tx: &mpsc::Sender<Result<Vec<Row>>>,
) -> Result<()> {
    let mut client = pool.get().await.map_err(|e| classify_pool_error(&e))?;
    let transaction = client
        .build_transaction()
        .read_only(true)
        .start()
        .await
        .map_err(|e| classify_pg_error(&e))?;

    let statement = transaction
        .prepare(sql)
        .await
        .map_err(|e| classify_pg_error(&e))?;
    let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlValue::as_dyn).collect();
    let portal = transaction
        .bind(&statement, &param_refs)
        .await
        .map_err(|e| classify_pg_error(&e))?;

    loop {
        let rows = transaction
            .query_portal(&portal, chunk_rows)
            .await
            .map_err(|e| classify_pg_error(&e))?;
        let exhausted = (rows.len() as i32) < chunk_rows;

        if !rows.is_empty() && tx.send(Ok(rows)).await.is_err() {
            // Consumer went away: drop the transaction, which cancels the
            // cursor and releases the connection.
            debug!("export consumer disconnected, cancelling cursor");
            return Ok(());
        }
        if exhausted {
            break;
        }
    }

    transaction.commit().await.map_err(|e| classify_pg_error(&e))?;
    Ok(())
}

/// Feedback export joined with the current annotation and topic.
#[must_use]
pub fn feedback_export_query(filters: &ExportFilters) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(
        r"
        SELECT f.id, f.body, f.source, f.customer_id,
               a.sentiment::float8 AS sentiment_score,
               f.created_at, a.updated_at,
               t.label AS primary_topic, t.keywords AS topic_keywords
        FROM feedback f
        LEFT JOIN annotations a ON a.feedback_id = f.id
        LEFT JOIN topics t ON t.id = a.topic_id
        WHERE 1 = 1
        ",
    );
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(source) = &filters.source {
        params.push(SqlValue::Text(source.clone()));
        sql.push_str(&format!(" AND f.source = ${}", params.len()));
    }
    if let Some(customer_id) = &filters.customer_id {
        params.push(SqlValue::Text(customer_id.clone()));
        sql.push_str(&format!(" AND f.customer_id = ${}", params.len()));
    }
    if let Some(start) = filters.start_date {
        params.push(SqlValue::Date(start));
        sql.push_str(&format!(" AND f.created_at::date >= ${}", params.len()));
    }
    if let Some(end) = filters.end_date {
        params.push(SqlValue::Date(end));
        sql.push_str(&format!(" AND f.created_at::date <= ${}", params.len()));
    }
    if let Some(min) = filters.sentiment_min {
        params.push(SqlValue::Float(min));
        sql.push_str(&format!(" AND a.sentiment::float8 >= ${}", params.len()));
    }
    if let Some(max) = filters.sentiment_max {
        params.push(SqlValue::Float(max));
        sql.push_str(&format!(" AND a.sentiment::float8 <= ${}", params.len()));
    }

    sql.push_str(" ORDER BY f.created_at");
    (sql, params)
}

/// Topics export with aggregate counts.
#[must_use]
pub fn topics_export_query(min_feedback_count: i64) -> (String, Vec<SqlValue>) {
    let sql = String::from(
        r"
        SELECT t.id, t.label, t.keywords, t.created_at, t.updated_at,
               COUNT(a.id) AS feedback_count,
               AVG(a.sentiment)::float8 AS avg_sentiment
        FROM topics t
        LEFT JOIN annotations a ON a.topic_id = t.id
        GROUP BY t.id, t.label, t.keywords, t.created_at, t.updated_at
        HAVING COUNT(a.id) >= $1
        ORDER BY t.id
        ",
    );
    (sql, vec![SqlValue::Int(min_feedback_count)])
}

/// Daily-aggregate export from the materialised view.
#[must_use]
pub fn analytics_export_query(start: NaiveDate, end: NaiveDate) -> (String, Vec<SqlValue>) {
    let sql = String::from(
        r"
        SELECT day, total_feedback, positive_feedback, negative_feedback,
               neutral_feedback, avg_sentiment, unique_customers, top_sources
        FROM daily_feedback_aggregates
        WHERE day BETWEEN $1 AND $2
        ORDER BY day
        ",
    );
    (sql, vec![SqlValue::Date(start), SqlValue::Date(end)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_query_no_filters() {
        let (sql, params) = feedback_export_query(&ExportFilters::default());
        assert!(params.is_empty());
        assert!(sql.contains("ORDER BY f.created_at"));
        assert!(!sql.contains("$1"));
    }

    #[test]
    fn test_feedback_query_numbers_params_in_order() {
        let filters = ExportFilters {
            source: Some("website".to_string()),
            start_date: Some("2024-01-01".parse().expect("date")),
            sentiment_min: Some(-1.0),
            ..ExportFilters::default()
        };
        let (sql, params) = feedback_export_query(&filters);
        assert_eq!(params.len(), 3);
        assert!(sql.contains("f.source = $1"));
        assert!(sql.contains("f.created_at::date >= $2"));
        assert!(sql.contains("a.sentiment::float8 >= $3"));
    }

    #[test]
    fn test_topics_query_shape() {
        let (sql, params) = topics_export_query(5);
        assert!(sql.contains("HAVING COUNT(a.id) >= $1"));
        assert_eq!(params.len(), 1);
    }
}
