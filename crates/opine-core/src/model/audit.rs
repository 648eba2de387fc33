//! Audit entry: immutable record of an admin mutation.

use chrono::{DateTime, Utc};
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};

/// Action tag of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Topic label/keywords rewritten.
    RelabelTopic,
    /// Feedback annotations moved to another topic.
    ReassignFeedback,
    /// Topic created (by the cluster stage or an admin).
    CreateTopic,
    /// Topic deleted; dependents reassigned to the sentinel.
    DeleteTopic,
    /// Feedback removed by the retention cleanup.
    DeleteFeedback,
}

impl AuditAction {
    /// Wire representation stored in the audit table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RelabelTopic => "relabel_topic",
            Self::ReassignFeedback => "reassign_feedback",
            Self::CreateTopic => "create_topic",
            Self::DeleteTopic => "delete_topic",
            Self::DeleteFeedback => "delete_feedback",
        }
    }

    /// Parse from the wire representation.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` for unknown action tags.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "relabel_topic" => Ok(Self::RelabelTopic),
            "reassign_feedback" => Ok(Self::ReassignFeedback),
            "create_topic" => Ok(Self::CreateTopic),
            "delete_topic" => Ok(Self::DeleteTopic),
            "delete_feedback" => Ok(Self::DeleteFeedback),
            other => Err(OpineError::validation(format!("unknown audit action: {other}"))),
        }
    }
}

/// One append-only audit row. Never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotone identifier.
    pub id: i64,

    /// Topic touched, when the act is topic-scoped.
    pub topic_id: Option<i64>,

    /// Action tag.
    pub action: AuditAction,

    /// State before the mutation (only fields that changed).
    pub before_state: Option<serde_json::Value>,

    /// State after the mutation (only fields that changed).
    pub after_state: Option<serde_json::Value>,

    /// Actor identity (token subject).
    pub actor: String,

    /// Actor IP, when known.
    pub actor_ip: Option<String>,

    /// Actor user-agent string, when known.
    pub actor_agent: Option<String>,

    /// Event timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip() {
        for action in [
            AuditAction::RelabelTopic,
            AuditAction::ReassignFeedback,
            AuditAction::CreateTopic,
            AuditAction::DeleteTopic,
            AuditAction::DeleteFeedback,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()).expect("roundtrip"), action);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(AuditAction::parse("drop_table").is_err());
    }
}
