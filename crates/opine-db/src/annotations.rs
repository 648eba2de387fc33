//! Annotation repository.
//!
//! Writes are keyed on `feedback_id` (unique): the annotate stage's upsert
//! makes replay idempotent, and topic reassignment updates the existing row
//! rather than creating a duplicate.

use deadpool_postgres::Pool;
use opine_core::{Annotation, Sentiment};
use opine_error::Result;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Scores produced by the annotate stage for one feedback.
#[derive(Debug, Clone)]
pub struct AnnotationScores {
    /// Sentiment class.
    pub sentiment: Sentiment,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
    /// Toxicity score, when the model provides one.
    pub toxicity: Option<f64>,
    /// Model version tag.
    pub model_version: String,
}

/// Repository over the annotations table.
#[derive(Clone)]
pub struct AnnotationRepo {
    pool: Pool,
}

impl AnnotationRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Write or rewrite the scores for a feedback.
    ///
    /// Replaying the same job rewrites identical values, so the operation
    /// is idempotent; the topic and embedding columns are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn upsert_scores(&self, feedback_id: Uuid, scores: &AnnotationScores) -> Result<()> {
        with_retry("annotations.upsert_scores", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            client
                .execute(
                    r"
                    INSERT INTO annotations
                        (id, feedback_id, sentiment, sentiment_confidence, toxicity, model_version, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, now())
                    ON CONFLICT (feedback_id) DO UPDATE SET
                        sentiment = EXCLUDED.sentiment,
                        sentiment_confidence = EXCLUDED.sentiment_confidence,
                        toxicity = EXCLUDED.toxicity,
                        model_version = EXCLUDED.model_version,
                        updated_at = now()
                    ",
                    &[
                        &Uuid::new_v4(),
                        &feedback_id,
                        &scores.sentiment.as_i16(),
                        &scores.confidence,
                        &scores.toxicity,
                        &scores.model_version,
                    ],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(())
        })
        .await
    }

    /// Store the embedding for a feedback's annotation.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn set_embedding(&self, feedback_id: Uuid, embedding: &[f64]) -> Result<u64> {
        with_retry("annotations.set_embedding", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let updated = client
                .execute(
                    "UPDATE annotations SET embedding = $2, updated_at = now() WHERE feedback_id = $1",
                    &[&feedback_id, &embedding],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(updated)
        })
        .await
    }

    /// Assign a topic to a feedback's annotation.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn set_topic(&self, feedback_id: Uuid, topic_id: i64) -> Result<u64> {
        with_retry("annotations.set_topic", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let updated = client
                .execute(
                    "UPDATE annotations SET topic_id = $2, updated_at = now() WHERE feedback_id = $1",
                    &[&feedback_id, &topic_id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(updated)
        })
        .await
    }

    /// Fetch the live annotation for a feedback.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn get_for_feedback(&self, feedback_id: Uuid) -> Result<Option<Annotation>> {
        with_retry("annotations.get_for_feedback", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_opt(
                    r"
                    SELECT id, feedback_id, sentiment, sentiment_confidence, topic_id,
                           toxicity, embedding, model_version, updated_at
                    FROM annotations WHERE feedback_id = $1
                    ",
                    &[&feedback_id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            row.map(|r| row_to_annotation(&r)).transpose()
        })
        .await
    }

    /// Topic-less annotations with embeddings: the unassigned pool the
    /// cluster stage draws from when spawning a topic.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn unassigned_pool(&self, limit: i64) -> Result<Vec<(Uuid, Vec<f64>)>> {
        with_retry("annotations.unassigned_pool", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query(
                    r"
                    SELECT feedback_id, embedding FROM annotations
                    WHERE topic_id IS NULL AND embedding IS NOT NULL
                    ORDER BY updated_at
                    LIMIT $1
                    ",
                    &[&limit],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
        })
        .await
    }

    /// Size of the unassigned pool.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn unassigned_pool_size(&self) -> Result<i64> {
        with_retry("annotations.unassigned_pool_size", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one(
                    "SELECT COUNT(*) FROM annotations WHERE topic_id IS NULL AND embedding IS NOT NULL",
                    &[],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }

    /// Total annotations (admin stats).
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn count_total(&self) -> Result<i64> {
        with_retry("annotations.count_total", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one("SELECT COUNT(*) FROM annotations", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }
}

fn row_to_annotation(row: &Row) -> Result<Annotation> {
    let sentiment: Option<i16> = row.get("sentiment");
    Ok(Annotation {
        id: row.get("id"),
        feedback_id: row.get("feedback_id"),
        sentiment: sentiment.map(Sentiment::from_i16).transpose()?,
        sentiment_confidence: row.get("sentiment_confidence"),
        topic_id: row.get("topic_id"),
        toxicity: row.get("toxicity"),
        embedding: row.get("embedding"),
        model_version: row.get("model_version"),
        updated_at: row.get("updated_at"),
    })
}
