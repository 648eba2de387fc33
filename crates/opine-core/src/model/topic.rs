//! Topic entity: a named cluster of semantically related feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel topic that absorbs annotations when their topic is deleted.
///
/// Created at schema bootstrap; never deleted.
pub const UNASSIGNED_TOPIC_ID: i64 = 0;

/// A topic row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Stable integer identifier.
    pub id: i64,

    /// Human-readable label. Mutable only through the admin path.
    pub label: String,

    /// Ordered keyword list.
    pub keywords: Vec<String>,

    /// Last mutation timestamp; advances strictly monotonically.
    pub updated_at: DateTime<Utc>,
}

impl Topic {
    /// Whether this is the unassigned sentinel.
    #[must_use]
    pub const fn is_unassigned(&self) -> bool {
        self.id == UNASSIGNED_TOPIC_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_sentinel() {
        let topic = Topic {
            id:         UNASSIGNED_TOPIC_ID,
            label:      "Unassigned".to_string(),
            keywords:   vec![],
            updated_at: Utc::now(),
        };
        assert!(topic.is_unassigned());
    }
}
