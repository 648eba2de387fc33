//! Feedback repository.

use deadpool_postgres::Pool;
use opine_core::Feedback;
use opine_error::Result;
use serde_json::Value;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Insertable feedback row. The creation timestamp is assigned by the
/// database at insert and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    /// Identifier assigned by the caller.
    pub id: Uuid,
    /// Source tag.
    pub source: String,
    /// Customer identifier, if supplied.
    pub customer_id: Option<String>,
    /// Body as submitted.
    pub body: String,
    /// Normalised body.
    pub normalized_text: String,
    /// Detected language, if any.
    pub language: Option<String>,
    /// Metadata object.
    pub metadata: Value,
    /// Owning batch for uploads.
    pub batch_id: Option<Uuid>,
}

const INSERT_SQL: &str = r"
    INSERT INTO feedback (id, source, customer_id, body, normalized_text, language, metadata, batch_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

const SELECT_SQL: &str = r"
    SELECT id, source, customer_id, body, normalized_text, language, metadata, batch_id, created_at
    FROM feedback
";

/// Repository over the feedback table.
#[derive(Clone)]
pub struct FeedbackRepo {
    pool: Pool,
}

impl FeedbackRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert one row.
    ///
    /// # Errors
    ///
    /// Returns the classified database error; a duplicate id surfaces as a
    /// conflict.
    pub async fn insert_one(&self, record: &FeedbackRecord) -> Result<()> {
        with_retry("feedback.insert_one", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            client
                .execute(
                    INSERT_SQL,
                    &[
                        &record.id,
                        &record.source,
                        &record.customer_id,
                        &record.body,
                        &record.normalized_text,
                        &record.language,
                        &record.metadata,
                        &record.batch_id,
                    ],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(())
        })
        .await
    }

    /// Insert a chunk of rows in one transaction.
    ///
    /// Used by batch ingest (chunks of ~500). Either all rows of the chunk
    /// land or none do.
    ///
    /// # Errors
    ///
    /// Returns the classified database error; the transaction rolls back.
    pub async fn insert_chunk(&self, records: &[FeedbackRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        with_retry("feedback.insert_chunk", || async {
            let mut client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let tx = client
                .transaction()
                .await
                .map_err(|e| classify_pg_error(&e))?;
            let statement = tx
                .prepare(INSERT_SQL)
                .await
                .map_err(|e| classify_pg_error(&e))?;
            for record in records {
                tx.execute(
                    &statement,
                    &[
                        &record.id,
                        &record.source,
                        &record.customer_id,
                        &record.body,
                        &record.normalized_text,
                        &record.language,
                        &record.metadata,
                        &record.batch_id,
                    ],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            }
            tx.commit().await.map_err(|e| classify_pg_error(&e))?;
            Ok(records.len() as u64)
        })
        .await
    }

    /// Fetch one feedback row.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn get(&self, id: Uuid) -> Result<Option<Feedback>> {
        with_retry("feedback.get", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let sql = format!("{SELECT_SQL} WHERE id = $1");
            let row = client
                .query_opt(&sql, &[&id])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.map(|r| row_to_feedback(&r)))
        })
        .await
    }

    /// Feedback ids and bodies for a batch, insertion order.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn bodies_for_batch(&self, batch_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        with_retry("feedback.bodies_for_batch", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query(
                    "SELECT id, normalized_text FROM feedback WHERE batch_id = $1 ORDER BY created_at",
                    &[&batch_id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
        })
        .await
    }

    /// Bodies for an explicit id list (single-item ingest path).
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn bodies_for_ids(&self, ids: &[Uuid]) -> Result<Vec<(Uuid, String)>> {
        with_retry("feedback.bodies_for_ids", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query(
                    "SELECT id, normalized_text FROM feedback WHERE id = ANY($1) ORDER BY created_at",
                    &[&ids],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
        })
        .await
    }

    /// Number of rows persisted under a batch.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn count_for_batch(&self, batch_id: Uuid) -> Result<i64> {
        with_retry("feedback.count_for_batch", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one("SELECT COUNT(*) FROM feedback WHERE batch_id = $1", &[&batch_id])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }

    /// Earliest and latest creation dates under a batch, if any rows exist.
    ///
    /// The reports stage uses this window for cache invalidation.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn date_window_for_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<(chrono::NaiveDate, chrono::NaiveDate)>> {
        with_retry("feedback.date_window_for_batch", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one(
                    "SELECT MIN(created_at)::date, MAX(created_at)::date
                     FROM feedback WHERE batch_id = $1",
                    &[&batch_id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            let min: Option<chrono::NaiveDate> = row.get(0);
            let max: Option<chrono::NaiveDate> = row.get(1);
            Ok(min.zip(max))
        })
        .await
    }

    /// Earliest and latest creation dates for an explicit id list.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn date_window_for_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Option<(chrono::NaiveDate, chrono::NaiveDate)>> {
        with_retry("feedback.date_window_for_ids", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one(
                    "SELECT MIN(created_at)::date, MAX(created_at)::date
                     FROM feedback WHERE id = ANY($1)",
                    &[&ids],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            let min: Option<chrono::NaiveDate> = row.get(0);
            let max: Option<chrono::NaiveDate> = row.get(1);
            Ok(min.zip(max))
        })
        .await
    }

    /// Total feedback rows (admin stats).
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn count_total(&self) -> Result<i64> {
        with_retry("feedback.count_total", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one("SELECT COUNT(*) FROM feedback", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }
}

pub(crate) fn row_to_feedback(row: &Row) -> Feedback {
    Feedback {
        id:              row.get("id"),
        source:          row.get("source"),
        customer_id:     row.get("customer_id"),
        body:            row.get("body"),
        normalized_text: row.get("normalized_text"),
        language:        row.get("language"),
        metadata:        row.get("metadata"),
        batch_id:        row.get("batch_id"),
        created_at:      row.get("created_at"),
    }
}
