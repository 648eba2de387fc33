//! Feedback entity: one customer utterance.

use chrono::{DateTime, Utc};
use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted body length in characters.
const MAX_BODY_CHARS: usize = 10_000;

/// A stored feedback row.
///
/// Immutable after creation except for admin-ordered deletion; the
/// `created_at` timestamp is assigned by the server clock at insert and
/// never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Opaque identifier assigned on creation.
    pub id: Uuid,

    /// Short source tag (e.g., "website", "app-store").
    pub source: String,

    /// Optional customer identifier.
    pub customer_id: Option<String>,

    /// Free-text body as submitted.
    pub body: String,

    /// Lowercased, whitespace-collapsed body (dedup and search input).
    pub normalized_text: String,

    /// Detected language tag (BCP-47-ish), if detection succeeded.
    pub language: Option<String>,

    /// Extensible key-value metadata.
    pub metadata: serde_json::Value,

    /// Batch this row arrived in, when it came through an upload.
    pub batch_id: Option<Uuid>,

    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

/// Input for creating one feedback row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeedback {
    /// Short source tag.
    pub source: String,

    /// Free-text body.
    pub body: String,

    /// Optional customer identifier.
    #[serde(default)]
    pub customer_id: Option<String>,

    /// Extensible key-value metadata.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewFeedback {
    /// Validate the submission.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` when the body is empty or the source
    /// tag is missing, `OpineError::TooLarge` when the body exceeds the cap.
    pub fn validate(&self) -> Result<()> {
        if self.body.trim().is_empty() {
            return Err(OpineError::validation_field("body must not be empty", "body"));
        }
        if self.body.chars().count() > MAX_BODY_CHARS {
            return Err(OpineError::too_large(format!(
                "body exceeds {MAX_BODY_CHARS} characters"
            )));
        }
        if self.source.trim().is_empty() {
            return Err(OpineError::validation_field("source must not be empty", "source"));
        }
        if let Some(meta) = &self.metadata {
            if !meta.is_object() {
                return Err(OpineError::validation_field(
                    "metadata must be a JSON object",
                    "metadata",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(body: &str) -> NewFeedback {
        NewFeedback {
            source:      "website".to_string(),
            body:        body.to_string(),
            customer_id: None,
            metadata:    None,
        }
    }

    #[test]
    fn test_valid_submission() {
        assert!(submission("Great product!").validate().is_ok());
    }

    #[test]
    fn test_empty_body_rejected() {
        let err = submission("   ").validate().unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let err = submission(&"x".repeat(10_001)).validate().unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn test_empty_source_rejected() {
        let mut sub = submission("fine");
        sub.source = String::new();
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_non_object_metadata_rejected() {
        let mut sub = submission("fine");
        sub.metadata = Some(json!([1, 2, 3]));
        assert!(sub.validate().is_err());

        sub.metadata = Some(json!({"plan": "pro"}));
        assert!(sub.validate().is_ok());
    }
}
