//! Batch repository.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use opine_core::{Batch, BatchCounters};
use opine_error::Result;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Repository over the batches table.
#[derive(Clone)]
pub struct BatchRepo {
    pool: Pool,
}

impl BatchRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Register a new batch before its rows start landing.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn create(&self, id: Uuid, source: &str) -> Result<()> {
        with_retry("batches.create", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            client
                .execute("INSERT INTO batches (id, source) VALUES ($1, $2)", &[&id, &source])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(())
        })
        .await
    }

    /// Write the final counters and aggregate job id for an upload.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn finalize(
        &self,
        id: Uuid,
        counters: &BatchCounters,
        job_id: Option<Uuid>,
    ) -> Result<()> {
        with_retry("batches.finalize", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            client
                .execute(
                    r"
                    UPDATE batches SET
                        processed_count = $2,
                        created_count = $3,
                        duplicate_count = $4,
                        error_count = $5,
                        skipped_non_english_count = $6,
                        job_id = $7
                    WHERE id = $1
                    ",
                    &[
                        &id,
                        &(counters.processed_count as i64),
                        &(counters.created_count as i64),
                        &(counters.duplicate_count as i64),
                        &(counters.error_count as i64),
                        &(counters.skipped_non_english_count as i64),
                        &job_id,
                    ],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(())
        })
        .await
    }

    /// Mark a batch complete if it is not already.
    ///
    /// The guard keeps the reports stage idempotent on replay.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn mark_completed(&self, id: Uuid) -> Result<bool> {
        with_retry("batches.mark_completed", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let updated = client
                .execute(
                    "UPDATE batches SET completed_at = now() WHERE id = $1 AND completed_at IS NULL",
                    &[&id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(updated > 0)
        })
        .await
    }

    /// Fetch one batch.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn get(&self, id: Uuid) -> Result<Option<Batch>> {
        with_retry("batches.get", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_opt(
                    r"
                    SELECT id, source, received_at, processed_count, created_count,
                           duplicate_count, error_count, skipped_non_english_count,
                           job_id, completed_at
                    FROM batches WHERE id = $1
                    ",
                    &[&id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.map(|r| row_to_batch(&r)))
        })
        .await
    }
}

#[allow(clippy::cast_sign_loss)]
fn row_to_batch(row: &Row) -> Batch {
    let completed_at: Option<DateTime<Utc>> = row.get("completed_at");
    Batch {
        id: row.get("id"),
        source: row.get("source"),
        received_at: row.get("received_at"),
        counters: BatchCounters {
            processed_count:           row.get::<_, i64>("processed_count") as u64,
            created_count:             row.get::<_, i64>("created_count") as u64,
            duplicate_count:           row.get::<_, i64>("duplicate_count") as u64,
            error_count:               row.get::<_, i64>("error_count") as u64,
            skipped_non_english_count: row.get::<_, i64>("skipped_non_english_count") as u64,
        },
        job_id: row.get("job_id"),
        completed_at,
    }
}
