//! Admin mutation engine: transactional writes with audit.
//!
//! Every mutation runs in one transaction holding a row-level lock on the
//! touched topic rows; the audit append commits or rolls back atomically
//! with the mutation. Cache invalidation and the materialised-view refresh
//! happen after commit, at the caller.

use chrono::{Duration, Utc};
use deadpool_postgres::Pool;
use opine_core::{AuditAction, Topic};
use opine_error::{OpineError, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::audit::{append_in_tx, ActorInfo};
use crate::error::{classify_pg_error, classify_pool_error};
use crate::topics::row_to_topic;

/// Minimum retention in days the cleanup endpoint will accept.
const MIN_CLEANUP_DAYS: i64 = 30;

/// Result of a relabel mutation.
#[derive(Debug, Clone)]
pub struct RelabelOutcome {
    /// Topic row after the mutation.
    pub topic: Topic,
    /// Identifier of the audit entry appended with it.
    pub audit_id: i64,
}

/// Transactional admin mutations.
#[derive(Clone)]
pub struct AdminMutator {
    pool: Pool,
}

impl AdminMutator {
    /// Create a mutator over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Rewrite a topic's label and keywords.
    ///
    /// In one transaction: lock and read the current row, write the new
    /// label/keywords with a strictly-advancing timestamp, and append one
    /// audit entry whose deltas cover only the fields that changed.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::NotFound` for an unknown topic id, or the
    /// classified database error; either way nothing is committed.
    pub async fn relabel_topic(
        &self,
        topic_id: i64,
        new_label: &str,
        new_keywords: &[String],
        actor: &ActorInfo,
    ) -> Result<RelabelOutcome> {
        let mut client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| classify_pg_error(&e))?;

        let current = tx
            .query_opt(
                "SELECT id, label, keywords, updated_at FROM topics WHERE id = $1 FOR UPDATE",
                &[&topic_id],
            )
            .await
            .map_err(|e| classify_pg_error(&e))?
            .ok_or_else(|| OpineError::not_found("Topic", topic_id.to_string()))?;

        let old_label: String = current.get("label");
        let old_keywords: Vec<String> = current.get("keywords");

        // Strictly monotone even when the wall clock stalls within one
        // microsecond of the previous mutation.
        let updated = tx
            .query_one(
                r"
                UPDATE topics
                SET label = $2, keywords = $3,
                    updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
                WHERE id = $1
                RETURNING id, label, keywords, updated_at
                ",
                &[&topic_id, &new_label, &new_keywords],
            )
            .await
            .map_err(|e| classify_pg_error(&e))?;

        let (before, after) = changed_fields(&[
            ("label", json!(old_label), json!(new_label)),
            ("keywords", json!(old_keywords), json!(new_keywords)),
        ]);
        let audit_id = append_in_tx(
            &*tx,
            Some(topic_id),
            AuditAction::RelabelTopic,
            Some(&before),
            Some(&after),
            actor,
        )
        .await?;

        tx.commit().await.map_err(|e| classify_pg_error(&e))?;
        Ok(RelabelOutcome {
            topic: row_to_topic(&updated),
            audit_id,
        })
    }

    /// Move the annotations of the given feedback to another topic.
    ///
    /// One audit entry is appended per reassigned feedback. A missing
    /// target topic, a missing feedback, or an unannotated feedback rolls
    /// the whole transaction back.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::NotFound` or the classified database error.
    pub async fn reassign_feedback(
        &self,
        feedback_ids: &[Uuid],
        target_topic_id: i64,
        reason: Option<&str>,
        actor: &ActorInfo,
    ) -> Result<usize> {
        if feedback_ids.is_empty() {
            return Err(OpineError::validation("feedback_ids must not be empty"));
        }

        let mut client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| classify_pg_error(&e))?;

        let target = tx
            .query_opt("SELECT id FROM topics WHERE id = $1", &[&target_topic_id])
            .await
            .map_err(|e| classify_pg_error(&e))?;
        if target.is_none() {
            return Err(OpineError::not_found("Topic", target_topic_id.to_string()));
        }

        for feedback_id in feedback_ids {
            let row = tx
                .query_opt(
                    "SELECT topic_id FROM annotations WHERE feedback_id = $1 FOR UPDATE",
                    &[feedback_id],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?
                .ok_or_else(|| OpineError::not_found("Annotation", feedback_id.to_string()))?;
            let old_topic: Option<i64> = row.get("topic_id");

            tx.execute(
                "UPDATE annotations SET topic_id = $2, updated_at = now() WHERE feedback_id = $1",
                &[feedback_id, &target_topic_id],
            )
            .await
            .map_err(|e| classify_pg_error(&e))?;

            let before = json!({ "topic_id": old_topic, "feedback_id": feedback_id });
            let mut after = Map::new();
            after.insert("topic_id".to_string(), json!(target_topic_id));
            after.insert("feedback_id".to_string(), json!(feedback_id));
            if let Some(reason) = reason {
                after.insert("reason".to_string(), json!(reason));
            }
            append_in_tx(
                &*tx,
                Some(target_topic_id),
                AuditAction::ReassignFeedback,
                Some(&before),
                Some(&Value::Object(after)),
                actor,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| classify_pg_error(&e))?;
        Ok(feedback_ids.len())
    }

    /// Delete feedback older than a cutoff, or count it on a dry run.
    ///
    /// Annotations cascade with their feedback; the deletion itself is
    /// audited with the affected count.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for a retention below the minimum,
    /// or the classified database error.
    pub async fn cleanup_old_data(
        &self,
        days_old: i64,
        dry_run: bool,
        actor: &ActorInfo,
    ) -> Result<u64> {
        if days_old < MIN_CLEANUP_DAYS {
            return Err(OpineError::validation(format!(
                "days_old must be at least {MIN_CLEANUP_DAYS}"
            )));
        }
        let cutoff = Utc::now() - Duration::days(days_old);

        let mut client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;

        if dry_run {
            let row = client
                .query_one("SELECT COUNT(*) FROM feedback WHERE created_at < $1", &[&cutoff])
                .await
                .map_err(|e| classify_pg_error(&e))?;
            let count: i64 = row.get(0);
            return Ok(count.max(0) as u64);
        }

        let tx = client
            .transaction()
            .await
            .map_err(|e| classify_pg_error(&e))?;
        let deleted = tx
            .execute("DELETE FROM feedback WHERE created_at < $1", &[&cutoff])
            .await
            .map_err(|e| classify_pg_error(&e))?;
        let before = json!({ "deleted_count": deleted, "cutoff": cutoff.to_rfc3339() });
        append_in_tx(
            &*tx,
            None,
            AuditAction::DeleteFeedback,
            Some(&before),
            None,
            actor,
        )
        .await?;
        tx.commit().await.map_err(|e| classify_pg_error(&e))?;
        Ok(deleted)
    }
}

/// Split field triples into before/after objects containing only the
/// fields whose values differ.
fn changed_fields(fields: &[(&str, Value, Value)]) -> (Value, Value) {
    let mut before = Map::new();
    let mut after = Map::new();
    for (name, old, new) in fields {
        if old != new {
            before.insert((*name).to_string(), old.clone());
            after.insert((*name).to_string(), new.clone());
        }
    }
    (Value::Object(before), Value::Object(after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_fields_only_diffs() {
        let (before, after) = changed_fields(&[
            ("label", json!("Shipping"), json!("Delivery")),
            ("keywords", json!(["slow"]), json!(["slow"])),
        ]);
        assert_eq!(before, json!({"label": "Shipping"}));
        assert_eq!(after, json!({"label": "Delivery"}));
    }

    #[test]
    fn test_changed_fields_all_same() {
        let (before, after) = changed_fields(&[("label", json!("A"), json!("A"))]);
        assert_eq!(before, json!({}));
        assert_eq!(after, json!({}));
    }
}
