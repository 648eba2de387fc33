//! Topic repository.

use deadpool_postgres::Pool;
use opine_core::Topic;
use opine_error::Result;
use tokio_postgres::Row;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Repository over the topics table.
#[derive(Clone)]
pub struct TopicRepo {
    pool: Pool,
}

impl TopicRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a topic with an initial centroid.
    ///
    /// Used by the cluster stage when the unassigned pool spawns a topic.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn create(
        &self,
        label: &str,
        keywords: &[String],
        centroid: Option<&[f64]>,
    ) -> Result<Topic> {
        with_retry("topics.create", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one(
                    r"
                    INSERT INTO topics (label, keywords, centroid)
                    VALUES ($1, $2, $3)
                    RETURNING id, label, keywords, updated_at
                    ",
                    &[&label, &keywords, &centroid],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row_to_topic(&row))
        })
        .await
    }

    /// Fetch one topic.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn get(&self, id: i64) -> Result<Option<Topic>> {
        with_retry("topics.get", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_opt(
                    "SELECT id, label, keywords, updated_at FROM topics WHERE id = $1",
                    &[&id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.map(|r| row_to_topic(&r)))
        })
        .await
    }

    /// All topics ordered by id.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn list(&self) -> Result<Vec<Topic>> {
        with_retry("topics.list", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query("SELECT id, label, keywords, updated_at FROM topics ORDER BY id", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(rows.iter().map(row_to_topic).collect())
        })
        .await
    }

    /// Topic centroids for nearest-centroid assignment.
    ///
    /// The sentinel topic has no centroid and is excluded.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn centroids(&self) -> Result<Vec<(i64, Vec<f64>)>> {
        with_retry("topics.centroids", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query(
                    "SELECT id, centroid FROM topics WHERE centroid IS NOT NULL ORDER BY id",
                    &[],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
        })
        .await
    }

    /// Replace a topic's centroid.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn update_centroid(&self, id: i64, centroid: &[f64]) -> Result<()> {
        with_retry("topics.update_centroid", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            client
                .execute("UPDATE topics SET centroid = $2 WHERE id = $1", &[&id, &centroid])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(())
        })
        .await
    }

    /// Number of annotations currently assigned to a topic.
    ///
    /// The cluster stage uses this for incremental centroid means.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn assignment_count(&self, id: i64) -> Result<i64> {
        with_retry("topics.assignment_count", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one("SELECT COUNT(*) FROM annotations WHERE topic_id = $1", &[&id])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }

    /// Total topics (admin stats).
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn count_total(&self) -> Result<i64> {
        with_retry("topics.count_total", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let row = client
                .query_one("SELECT COUNT(*) FROM topics", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(row.get(0))
        })
        .await
    }
}

pub(crate) fn row_to_topic(row: &Row) -> Topic {
    Topic {
        id:         row.get("id"),
        label:      row.get("label"),
        keywords:   row.get("keywords"),
        updated_at: row.get("updated_at"),
    }
}
