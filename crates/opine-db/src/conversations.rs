//! QA conversation history repository.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use opine_error::Result;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// One stored QA exchange.
#[derive(Debug, Clone)]
pub struct ConversationRow {
    /// Exchange identifier.
    pub id: Uuid,
    /// The question as asked.
    pub question: String,
    /// The grounded answer.
    pub answer: String,
    /// Citation list as stored.
    pub citations: Value,
    /// Filter bundle supplied by the caller, if any.
    pub filters: Option<Value>,
    /// When the exchange happened.
    pub created_at: DateTime<Utc>,
}

/// Repository over the conversations table.
#[derive(Clone)]
pub struct ConversationRepo {
    pool: Pool,
}

impl ConversationRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Persist one exchange.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn insert(
        &self,
        question: &str,
        answer: &str,
        citations: &Value,
        filters: Option<&Value>,
    ) -> Result<Uuid> {
        with_retry("conversations.insert", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let id = Uuid::new_v4();
            client
                .execute(
                    "INSERT INTO conversations (id, question, answer, citations, filters)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[&id, &question, &answer, &citations, &filters],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(id)
        })
        .await
    }

    /// Page through history, newest first.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn list(&self, page: i64, page_size: i64) -> Result<(Vec<ConversationRow>, i64)> {
        with_retry("conversations.list", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let offset = (page - 1) * page_size;
            let rows = client
                .query(
                    "SELECT id, question, answer, citations, filters, created_at
                     FROM conversations ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    &[&page_size, &offset],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            let total: i64 = client
                .query_one("SELECT COUNT(*) FROM conversations", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?
                .get(0);
            let items = rows
                .iter()
                .map(|r| ConversationRow {
                    id:         r.get("id"),
                    question:   r.get("question"),
                    answer:     r.get("answer"),
                    citations:  r.get("citations"),
                    filters:    r.get("filters"),
                    created_at: r.get("created_at"),
                })
                .collect();
            Ok((items, total))
        })
        .await
    }

    /// Delete all stored history.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn clear(&self) -> Result<u64> {
        with_retry("conversations.clear", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let deleted = client
                .execute("DELETE FROM conversations", &[])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            Ok(deleted)
        })
        .await
    }
}
