//! Row parsing and per-row processing for uploads.
//!
//! `RowProcessor` owns the pure part of ingest: validation, normalisation,
//! language gating, and within-batch dedup. It has no I/O, which is what
//! keeps the streaming upload paths thin.

use std::collections::HashSet;

use opine_core::model::{NewFeedback, RowOutcome};
use opine_core::text;
use opine_db::feedback::FeedbackRecord;
use opine_error::{OpineError, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Column aliases accepted for the feedback body.
const BODY_COLUMNS: &[&str] = &["text", "body", "feedback"];

/// One raw upload row before validation.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// Feedback body.
    pub body: String,
    /// Customer identifier, if present.
    pub customer_id: Option<String>,
    /// Metadata object (declared plus unknown columns).
    pub metadata: Map<String, Value>,
}

/// Parse a CSV header into the body/customer/metadata column layout.
///
/// # Errors
///
/// Returns `OpineError::Validation` when no body column is present.
pub fn csv_layout(headers: &csv::StringRecord) -> Result<CsvLayout> {
    let mut body_idx = None;
    let mut customer_idx = None;
    let mut metadata_idx = None;
    let mut extra: Vec<(usize, String)> = Vec::new();

    for (idx, name) in headers.iter().enumerate() {
        let lower = name.trim().to_lowercase();
        if body_idx.is_none() && BODY_COLUMNS.contains(&lower.as_str()) {
            body_idx = Some(idx);
        } else if lower == "customer_id" {
            customer_idx = Some(idx);
        } else if lower == "metadata" {
            metadata_idx = Some(idx);
        } else if !lower.is_empty() {
            extra.push((idx, lower));
        }
    }

    let body_idx = body_idx.ok_or_else(|| {
        OpineError::validation("CSV must have a 'text', 'body', or 'feedback' column")
    })?;
    Ok(CsvLayout {
        body_idx,
        customer_idx,
        metadata_idx,
        extra,
    })
}

/// Resolved CSV column layout.
#[derive(Debug, Clone)]
pub struct CsvLayout {
    body_idx: usize,
    customer_idx: Option<usize>,
    metadata_idx: Option<usize>,
    /// Unknown columns folded into metadata.
    extra: Vec<(usize, String)>,
}

impl CsvLayout {
    /// Extract a raw row from a CSV record.
    #[must_use]
    pub fn extract(&self, record: &csv::StringRecord) -> RawRow {
        let mut metadata = Map::new();
        if let Some(idx) = self.metadata_idx {
            if let Some(raw) = record.get(idx) {
                if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(raw) {
                    metadata = parsed;
                }
            }
        }
        for (idx, name) in &self.extra {
            if let Some(value) = record.get(*idx) {
                if !value.is_empty() {
                    metadata.insert(name.clone(), Value::String(value.to_string()));
                }
            }
        }
        RawRow {
            body: record.get(self.body_idx).unwrap_or_default().to_string(),
            customer_id: self
                .customer_idx
                .and_then(|idx| record.get(idx))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            metadata,
        }
    }
}

/// Parse one JSONL line into a raw row.
///
/// Accepts the same body aliases as CSV; unknown fields land in metadata.
///
/// # Errors
///
/// Returns `OpineError::Validation` for unparseable lines or missing body.
pub fn parse_jsonl_line(line: &str) -> Result<RawRow> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| OpineError::validation(format!("invalid JSON line: {e}")))?;
    let Value::Object(mut fields) = value else {
        return Err(OpineError::validation("JSONL line must be an object"));
    };

    let mut body = None;
    for column in BODY_COLUMNS {
        if let Some(Value::String(text)) = fields.remove(*column) {
            body = Some(text);
            break;
        }
    }
    let body =
        body.ok_or_else(|| OpineError::validation("JSONL line missing 'text' or 'body' field"))?;

    let customer_id = match fields.remove("customer_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
        _ => None,
    };

    let mut metadata = Map::new();
    if let Some(Value::Object(declared)) = fields.remove("metadata") {
        metadata = declared;
    }
    for (key, value) in fields {
        metadata.insert(key, value);
    }

    Ok(RawRow {
        body,
        customer_id,
        metadata,
    })
}

/// Stateful per-row processor for one upload batch.
pub struct RowProcessor {
    source: String,
    batch_id: Uuid,
    english_only: bool,
    seen: HashSet<String>,
}

impl RowProcessor {
    /// Create a processor for a batch.
    #[must_use]
    pub fn new(source: &str, batch_id: Uuid, english_only: bool) -> Self {
        Self {
            source: source.to_string(),
            batch_id,
            english_only,
            seen: HashSet::new(),
        }
    }

    /// Validate, normalise, dedup, and language-gate one row.
    ///
    /// Returns the outcome (in input order semantics) and, for created
    /// rows, the record to persist.
    pub fn process(&mut self, raw: RawRow) -> (RowOutcome, Option<FeedbackRecord>) {
        let submission = NewFeedback {
            source:      self.source.clone(),
            body:        raw.body,
            customer_id: raw.customer_id,
            metadata:    Some(Value::Object(raw.metadata)),
        };
        if let Err(e) = submission.validate() {
            return (RowOutcome::Error(e.to_string()), None);
        }

        let normalized = text::normalize(&submission.body);
        let dedup = text::dedup_key(&normalized, &self.source, submission.customer_id.as_deref());
        if !self.seen.insert(dedup) {
            return (RowOutcome::Duplicate, None);
        }

        if self.english_only && !text::passes_english_filter(&submission.body) {
            return (RowOutcome::SkippedNonEnglish, None);
        }

        let id = Uuid::new_v4();
        let record = FeedbackRecord {
            id,
            source: self.source.clone(),
            customer_id: submission.customer_id,
            body: submission.body,
            normalized_text: normalized.clone(),
            language: text::detect_language(&normalized),
            metadata: submission.metadata.unwrap_or_else(|| Value::Object(Map::new())),
            batch_id: Some(self.batch_id),
        };
        (RowOutcome::Created(id), Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(body: &str, customer: Option<&str>) -> RawRow {
        RawRow {
            body: body.to_string(),
            customer_id: customer.map(String::from),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_csv_layout_aliases() {
        let headers = csv::StringRecord::from(vec!["Body", "customer_id", "plan"]);
        let layout = csv_layout(&headers).expect("layout");
        let record = csv::StringRecord::from(vec!["Great product", "c1", "pro"]);
        let row = layout.extract(&record);
        assert_eq!(row.body, "Great product");
        assert_eq!(row.customer_id.as_deref(), Some("c1"));
        assert_eq!(row.metadata.get("plan"), Some(&Value::String("pro".to_string())));
    }

    #[test]
    fn test_csv_layout_missing_body() {
        let headers = csv::StringRecord::from(vec!["customer_id", "rating"]);
        assert!(csv_layout(&headers).is_err());
    }

    #[test]
    fn test_csv_metadata_column_parsed() {
        let headers = csv::StringRecord::from(vec!["text", "metadata"]);
        let layout = csv_layout(&headers).expect("layout");
        let record = csv::StringRecord::from(vec!["fine", r#"{"plan":"pro"}"#]);
        let row = layout.extract(&record);
        assert_eq!(row.metadata.get("plan"), Some(&Value::String("pro".to_string())));
    }

    #[test]
    fn test_jsonl_line_with_extras() {
        let row = parse_jsonl_line(r#"{"text":"Slow checkout","customer_id":"c9","channel":"web"}"#)
            .expect("parse");
        assert_eq!(row.body, "Slow checkout");
        assert_eq!(row.customer_id.as_deref(), Some("c9"));
        assert_eq!(row.metadata.get("channel"), Some(&Value::String("web".to_string())));
    }

    #[test]
    fn test_jsonl_line_missing_body() {
        assert!(parse_jsonl_line(r#"{"customer_id":"c9"}"#).is_err());
        assert!(parse_jsonl_line("not json").is_err());
        assert!(parse_jsonl_line("[1,2]").is_err());
    }

    #[test]
    fn test_processor_dedups_within_batch() {
        let mut processor = RowProcessor::new("website", Uuid::new_v4(), false);

        let (first, record) = processor.process(raw("Great product!", Some("c1")));
        assert!(matches!(first, RowOutcome::Created(_)));
        assert!(record.is_some());

        // Same normalised text, source, and customer: duplicate.
        let (second, record) = processor.process(raw("  GREAT   product! ", Some("c1")));
        assert_eq!(second, RowOutcome::Duplicate);
        assert!(record.is_none());

        // Different customer: distinct row.
        let (third, _) = processor.process(raw("Great product!", Some("c2")));
        assert!(matches!(third, RowOutcome::Created(_)));
    }

    #[test]
    fn test_processor_rejects_empty_body() {
        let mut processor = RowProcessor::new("website", Uuid::new_v4(), false);
        let (outcome, record) = processor.process(raw("   ", None));
        assert!(matches!(outcome, RowOutcome::Error(_)));
        assert!(record.is_none());
    }

    #[test]
    fn test_processor_english_only_gate() {
        let mut processor = RowProcessor::new("website", Uuid::new_v4(), true);

        let (es, _) = processor.process(raw("El producto es muy bueno pero no es barato", None));
        assert_eq!(es, RowOutcome::SkippedNonEnglish);

        let (en, _) = processor.process(raw("The product is great and I love it", None));
        assert!(matches!(en, RowOutcome::Created(_)));

        // Undetected language is kept.
        let (unknown, _) = processor.process(raw("zzzz qqqq wwww", None));
        assert!(matches!(unknown, RowOutcome::Created(_)));
    }

    #[test]
    fn test_processor_sets_batch_and_language() {
        let batch_id = Uuid::new_v4();
        let mut processor = RowProcessor::new("app", batch_id, false);
        let (_, record) = processor.process(raw("The delivery was fast and I love this product", None));
        let record = record.expect("record");
        assert_eq!(record.batch_id, Some(batch_id));
        assert_eq!(record.language.as_deref(), Some("en"));
        assert_eq!(record.normalized_text, "the delivery was fast and i love this product");
    }
}
