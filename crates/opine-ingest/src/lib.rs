//! Ingestion pipeline: single submissions, bulk batches, and streaming
//! CSV/JSONL uploads.
//!
//! Dedup is within-batch only (cheap); cross-batch dedup is the
//! submitter's responsibility. Accepted rows persist in chunks, and every
//! successful ingest enqueues exactly one `annotate` job so the enrichment
//! pipeline picks the rows up.

pub mod rows;
mod upload;

use std::sync::Arc;

use opine_core::model::{BatchCounters, NewFeedback, RowOutcome};
use opine_core::text;
use opine_db::batches::BatchRepo;
use opine_db::feedback::{FeedbackRecord, FeedbackRepo};
use opine_error::{OpineError, Result};
use opine_queue::{Job, JobPayload, JobQueue, QueueName};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

pub use upload::UploadOutcome;

/// Maximum items per bulk submission.
pub const MAX_BATCH_ITEMS: usize = 1_000;

/// Rows persisted per transaction during uploads.
pub const UPLOAD_CHUNK_ROWS: usize = 500;

/// Outcome of a bulk submission.
#[derive(Debug)]
pub struct BatchSubmitOutcome {
    /// Batch identifier.
    pub batch_id: Uuid,
    /// Enrichment job identifier.
    pub job_id: Uuid,
    /// Per-item outcomes in input order.
    pub outcomes: Vec<RowOutcome>,
}

/// The ingestion pipeline.
#[derive(Clone)]
pub struct IngestPipeline {
    feedback: FeedbackRepo,
    batches: BatchRepo,
    queue: Arc<dyn JobQueue>,
    english_only: bool,
}

impl IngestPipeline {
    /// Assemble the pipeline from its adapters.
    #[must_use]
    pub fn new(
        feedback: FeedbackRepo,
        batches: BatchRepo,
        queue: Arc<dyn JobQueue>,
        english_only: bool,
    ) -> Self {
        Self {
            feedback,
            batches,
            queue,
            english_only,
        }
    }

    pub(crate) const fn english_only(&self) -> bool {
        self.english_only
    }

    pub(crate) const fn feedback_repo(&self) -> &FeedbackRepo {
        &self.feedback
    }

    pub(crate) const fn batch_repo(&self) -> &BatchRepo {
        &self.batches
    }

    /// Ingest one feedback synchronously.
    ///
    /// Validates, normalises, persists one row, and enqueues an `annotate`
    /// job for the single identifier.
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad submissions, or the classified
    /// database/queue error.
    pub async fn create_one(&self, submission: NewFeedback) -> Result<Uuid> {
        submission.validate()?;

        let normalized = text::normalize(&submission.body);
        let id = Uuid::new_v4();
        let record = FeedbackRecord {
            id,
            source: submission.source.clone(),
            customer_id: submission.customer_id,
            body: submission.body,
            normalized_text: normalized.clone(),
            language: text::detect_language(&normalized),
            metadata: submission
                .metadata
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            batch_id: None,
        };
        self.feedback.insert_one(&record).await?;

        self.queue
            .enqueue(Job::new(QueueName::Annotate, JobPayload::Feedback {
                feedback_ids: vec![id],
            }))
            .await?;

        info!(feedback_id = %id, source = %record.source, "feedback ingested");
        Ok(id)
    }

    /// Ingest a bulk submission of up to [`MAX_BATCH_ITEMS`] items.
    ///
    /// Each item carries its own source; the dedup triple is per item.
    /// Accepted rows insert in a single transaction; outcomes come back in
    /// input order. One `annotate` job covers the whole batch.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::TooLarge` over the cap, or the classified
    /// database/queue error (the transaction rolls back).
    pub async fn create_batch(&self, items: Vec<NewFeedback>) -> Result<BatchSubmitOutcome> {
        if items.len() > MAX_BATCH_ITEMS {
            return Err(OpineError::too_large(format!(
                "batch exceeds {MAX_BATCH_ITEMS} items"
            )));
        }

        let batch_id = Uuid::new_v4();
        let batch_source = items
            .first()
            .map_or_else(|| "bulk".to_string(), |item| item.source.clone());
        self.batches.create(batch_id, &batch_source).await?;

        let mut outcomes = Vec::with_capacity(items.len());
        let mut records = Vec::new();
        let mut counters = BatchCounters::default();
        let mut seen = std::collections::HashSet::new();

        for item in items {
            let outcome = match self.prepare_batch_item(item, batch_id, &mut seen) {
                Ok(Some(record)) => {
                    let id = record.id;
                    records.push(record);
                    RowOutcome::Created(id)
                },
                Ok(None) => RowOutcome::Duplicate,
                Err(e) => RowOutcome::Error(e.to_string()),
            };
            counters.record(&outcome);
            outcomes.push(outcome);
        }

        self.feedback.insert_chunk(&records).await?;

        let job = Job::new(QueueName::Annotate, JobPayload::Batch { batch_id });
        let job_id = job.id;
        self.queue.enqueue(job).await?;
        self.batches.finalize(batch_id, &counters, Some(job_id)).await?;

        info!(
            batch_id = %batch_id,
            created = counters.created_count,
            duplicates = counters.duplicate_count,
            errors = counters.error_count,
            "bulk submission ingested"
        );
        Ok(BatchSubmitOutcome {
            batch_id,
            job_id,
            outcomes,
        })
    }

    /// Validate and prepare one bulk item; `Ok(None)` marks a duplicate.
    fn prepare_batch_item(
        &self,
        item: NewFeedback,
        batch_id: Uuid,
        seen: &mut std::collections::HashSet<String>,
    ) -> Result<Option<FeedbackRecord>> {
        item.validate()?;

        let normalized = text::normalize(&item.body);
        let dedup = text::dedup_key(&normalized, &item.source, item.customer_id.as_deref());
        if !seen.insert(dedup) {
            return Ok(None);
        }
        if self.english_only && !text::passes_english_filter(&item.body) {
            return Err(OpineError::validation("non-English body rejected by ingest policy"));
        }

        Ok(Some(FeedbackRecord {
            id: Uuid::new_v4(),
            source: item.source,
            customer_id: item.customer_id,
            body: item.body,
            normalized_text: normalized.clone(),
            language: text::detect_language(&normalized),
            metadata: item
                .metadata
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            batch_id: Some(batch_id),
        }))
    }

    /// Uploads enter the pipeline through the `ingest` queue: the ingest
    /// stage verifies the batch rows persisted before cascading to
    /// `annotate`.
    pub(crate) async fn enqueue_ingest(&self, batch_id: Uuid) -> Result<Uuid> {
        let job = Job::new(QueueName::Ingest, JobPayload::Batch { batch_id });
        let job_id = job.id;
        self.queue.enqueue(job).await?;
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_cap_constant() {
        // The HTTP layer advertises the same cap.
        assert_eq!(MAX_BATCH_ITEMS, 1_000);
        assert_eq!(UPLOAD_CHUNK_ROWS, 500);
    }
}
