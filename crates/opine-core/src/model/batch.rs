//! Batch entity: an ingest file or bulk submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-row outcome counters for an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    /// Rows seen in the upload.
    pub processed_count: u64,
    /// Rows persisted.
    pub created_count: u64,
    /// Rows dropped as within-batch duplicates.
    pub duplicate_count: u64,
    /// Rows that failed validation or parsing.
    pub error_count: u64,
    /// Rows dropped by the English-only toggle.
    pub skipped_non_english_count: u64,
}

impl BatchCounters {
    /// Fold one row outcome into the counters.
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.processed_count += 1;
        match outcome {
            RowOutcome::Created(_) => self.created_count += 1,
            RowOutcome::Duplicate => self.duplicate_count += 1,
            RowOutcome::Error(_) => self.error_count += 1,
            RowOutcome::SkippedNonEnglish => self.skipped_non_english_count += 1,
        }
    }
}

/// Outcome of one ingested row, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Row persisted under this feedback id.
    Created(Uuid),
    /// Row matched an earlier row of the same batch.
    Duplicate,
    /// Row rejected; the message explains why.
    Error(String),
    /// Row dropped because it was detected as non-English.
    SkippedNonEnglish,
}

/// A batch row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Opaque identifier.
    pub id: Uuid,

    /// Source tag the upload was submitted under.
    pub source: String,

    /// Upload arrival time.
    pub received_at: DateTime<Utc>,

    /// Per-row outcome counters.
    pub counters: BatchCounters,

    /// Aggregate enrichment job, once enqueued.
    pub job_id: Option<Uuid>,

    /// Set by the reports stage when enrichment finished.
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_record() {
        let mut counters = BatchCounters::default();
        counters.record(&RowOutcome::Created(Uuid::new_v4()));
        counters.record(&RowOutcome::Created(Uuid::new_v4()));
        counters.record(&RowOutcome::Duplicate);
        counters.record(&RowOutcome::Error("empty body".to_string()));
        counters.record(&RowOutcome::SkippedNonEnglish);

        assert_eq!(counters.processed_count, 5);
        assert_eq!(counters.created_count, 2);
        assert_eq!(counters.duplicate_count, 1);
        assert_eq!(counters.error_count, 1);
        assert_eq!(counters.skipped_non_english_count, 1);
    }
}
