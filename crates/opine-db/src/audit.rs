//! Audit repository.
//!
//! The audit table is append-only: this module exposes insert and read
//! operations and nothing else. No UPDATE or DELETE statement for
//! `topic_audit` exists anywhere in the workspace.

use deadpool_postgres::Pool;
use opine_core::{AuditAction, AuditEntry};
use opine_error::Result;
use serde_json::Value;
use tokio_postgres::{GenericClient, Row};

use crate::error::{classify_pg_error, classify_pool_error};
use crate::retry::with_retry;

/// Identity attached to every audited mutation.
#[derive(Debug, Clone)]
pub struct ActorInfo {
    /// Token subject performing the mutation.
    pub actor: String,
    /// Client IP, when known.
    pub ip: Option<String>,
    /// Client user-agent, when known.
    pub agent: Option<String>,
}

const INSERT_SQL: &str = r"
    INSERT INTO topic_audit (topic_id, action, before_state, after_state, actor, actor_ip, actor_agent)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING id
";

const SELECT_SQL: &str = r"
    SELECT id, topic_id, action, before_state, after_state, actor, actor_ip, actor_agent, created_at
    FROM topic_audit
";

/// Append one audit row inside an open transaction.
///
/// The mutation engine calls this so the audit append commits or rolls
/// back atomically with the mutation it records.
///
/// # Errors
///
/// Returns the classified database error.
pub async fn append_in_tx<C: GenericClient>(
    client: &C,
    topic_id: Option<i64>,
    action: AuditAction,
    before_state: Option<&Value>,
    after_state: Option<&Value>,
    actor: &ActorInfo,
) -> Result<i64> {
    let row = client
        .query_one(
            INSERT_SQL,
            &[
                &topic_id,
                &action.as_str(),
                &before_state,
                &after_state,
                &actor.actor,
                &actor.ip,
                &actor.agent,
            ],
        )
        .await
        .map_err(|e| classify_pg_error(&e))?;
    Ok(row.get(0))
}

/// Read-side repository over the audit table.
#[derive(Clone)]
pub struct AuditRepo {
    pool: Pool,
}

impl AuditRepo {
    /// Create a repository over the pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// List entries, newest first, optionally scoped to one topic.
    ///
    /// # Errors
    ///
    /// Returns the classified database error.
    pub async fn list(&self, topic_id: Option<i64>, limit: i64) -> Result<Vec<AuditEntry>> {
        with_retry("audit.list", || async {
            let client = self.pool.get().await.map_err(|e| classify_pool_error(&e))?;
            let rows = client
                .query(
                    &format!(
                        "{SELECT_SQL} WHERE ($1::bigint IS NULL OR topic_id = $1)
                         ORDER BY id DESC LIMIT $2"
                    ),
                    &[&topic_id, &limit],
                )
                .await
                .map_err(|e| classify_pg_error(&e))?;
            rows.iter().map(row_to_entry).collect()
        })
        .await
    }
}

fn row_to_entry(row: &Row) -> Result<AuditEntry> {
    let action: String = row.get("action");
    Ok(AuditEntry {
        id: row.get("id"),
        topic_id: row.get("topic_id"),
        action: AuditAction::parse(&action)?,
        before_state: row.get("before_state"),
        after_state: row.get("after_state"),
        actor: row.get("actor"),
        actor_ip: row.get("actor_ip"),
        actor_agent: row.get("actor_agent"),
        created_at: row.get("created_at"),
    })
}
