//! The four enrichment stages.
//!
//! Stage dispatch is by queue name; payloads carry either a batch id or an
//! explicit feedback id list. Failure semantics per stage:
//! - transient I/O failure (DB, vector store, model endpoint) bubbles out
//!   of `process`, so the worker re-enqueues with backoff;
//! - a logical failure on one row skips that row, counts it, and the batch
//!   continues;
//! - exhausted attempts land the job on the dead letter queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opine_cache::Cache;
use opine_core::analytics::ANALYTICS_KEY_PREFIX;
use opine_db::annotations::{AnnotationRepo, AnnotationScores};
use opine_db::batches::BatchRepo;
use opine_db::feedback::FeedbackRepo;
use opine_db::topics::TopicRepo;
use opine_db::{matview, Pool};
use opine_error::{OpineError, Result};
use opine_queue::{Job, JobPayload, JobQueue, QueueName};
use opine_vector::{cosine_similarity, VectorIndex, VectorPoint};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::keywords::{synthesize_label, top_keywords};
use crate::metrics;
use crate::model::EnrichmentModel;
use crate::worker::JobProcessor;

/// Minimum cosine similarity for nearest-centroid assignment.
pub const SIMILARITY_THRESHOLD: f64 = 0.55;

/// Unassigned-pool size that triggers a topic spawn.
pub const UNASSIGNED_POOL_THRESHOLD: i64 = 50;

/// Maximum pool members considered when spawning a topic.
const POOL_SAMPLE_LIMIT: i64 = 200;

/// Visibility timeout handed to the queue for every stage.
pub const STAGE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Adapters shared by all stages.
#[derive(Clone)]
pub struct StageContext {
    feedback: FeedbackRepo,
    annotations: AnnotationRepo,
    topics: TopicRepo,
    batches: BatchRepo,
    queue: Arc<dyn JobQueue>,
    vector: Arc<dyn VectorIndex>,
    cache: Arc<dyn Cache>,
    model: Arc<dyn EnrichmentModel>,
    pool: Pool,
}

impl StageContext {
    /// Assemble the stage context.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        pool: Pool,
        queue: Arc<dyn JobQueue>,
        vector: Arc<dyn VectorIndex>,
        cache: Arc<dyn Cache>,
        model: Arc<dyn EnrichmentModel>,
    ) -> Self {
        Self {
            feedback: FeedbackRepo::new(pool.clone()),
            annotations: AnnotationRepo::new(pool.clone()),
            topics: TopicRepo::new(pool.clone()),
            batches: BatchRepo::new(pool.clone()),
            queue,
            vector,
            cache,
            model,
            pool,
        }
    }

    /// Resolve a payload to (feedback id, normalised text) pairs.
    async fn rows_for_payload(&self, payload: &JobPayload) -> Result<Vec<(Uuid, String)>> {
        match payload {
            JobPayload::Batch { batch_id } => self.feedback.bodies_for_batch(*batch_id).await,
            JobPayload::Feedback { feedback_ids } => {
                self.feedback.bodies_for_ids(feedback_ids).await
            },
            JobPayload::ReportWindow { .. } => Err(OpineError::validation(
                "report payload routed to an enrichment stage",
            )),
        }
    }

    async fn date_window(&self, payload: &JobPayload) -> Result<Option<(chrono::NaiveDate, chrono::NaiveDate)>> {
        match payload {
            JobPayload::Batch { batch_id } => self.feedback.date_window_for_batch(*batch_id).await,
            JobPayload::Feedback { feedback_ids } => {
                self.feedback.date_window_for_ids(feedback_ids).await
            },
            JobPayload::ReportWindow { .. } => Ok(None),
        }
    }

    /// Ingest stage: verify the batch rows persisted, then cascade.
    async fn run_ingest(&self, payload: &JobPayload) -> Result<()> {
        let JobPayload::Batch { batch_id } = payload else {
            // Single-item ingest skips this stage entirely.
            return self
                .queue
                .enqueue(Job::new(QueueName::Annotate, payload.clone()))
                .await;
        };

        let Some(batch) = self.batches.get(*batch_id).await? else {
            // Replay after the batch was cleaned up: nothing to do.
            warn!(batch_id = %batch_id, "ingest job for unknown batch, skipping");
            return Ok(());
        };

        let persisted = self.feedback.count_for_batch(*batch_id).await?;
        if (persisted as u64) < batch.counters.created_count {
            // Rows still committing; retry after backoff.
            return Err(OpineError::unavailable(
                "database",
                format!(
                    "batch {batch_id} has {persisted} of {} rows persisted",
                    batch.counters.created_count
                ),
            ));
        }

        self.queue
            .enqueue(Job::new(QueueName::Annotate, payload.clone()))
            .await?;
        info!(batch_id = %batch_id, rows = persisted, "batch verified, annotate enqueued");
        Ok(())
    }

    /// Annotate stage: sentiment and toxicity per row, then cascade.
    async fn run_annotate(&self, payload: &JobPayload) -> Result<()> {
        let rows = self.rows_for_payload(payload).await?;
        let mut annotated = 0usize;

        for (feedback_id, text) in &rows {
            let scores = match self.score_row(text).await {
                Ok(scores) => scores,
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    metrics::row_skipped("annotate");
                    warn!(feedback_id = %feedback_id, error = %e, "row skipped in annotate");
                    continue;
                },
            };
            match self.annotations.upsert_scores(*feedback_id, &scores).await {
                Ok(()) => annotated += 1,
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    metrics::row_skipped("annotate");
                    warn!(feedback_id = %feedback_id, error = %e, "annotation write skipped");
                },
            }
        }

        self.queue
            .enqueue(Job::new(QueueName::Cluster, payload.clone()))
            .await?;
        info!(rows = rows.len(), annotated, "annotate stage complete");
        Ok(())
    }

    async fn score_row(&self, text: &str) -> Result<AnnotationScores> {
        let sentiment = self.model.sentiment(text).await?;
        let toxicity = self.model.toxicity(text).await?;
        Ok(AnnotationScores {
            sentiment: sentiment.sentiment,
            confidence: sentiment.confidence,
            toxicity,
            model_version: self.model.version().to_string(),
        })
    }

    /// Cluster stage: embed, upsert into the vector store, assign topics,
    /// then enqueue the report job for the affected window.
    async fn run_cluster(&self, payload: &JobPayload) -> Result<()> {
        let rows = self.rows_for_payload(payload).await?;
        let mut centroids = self.topics.centroids().await?;

        for (feedback_id, text) in &rows {
            let embedding = match self.model.embed(text).await {
                Ok(embedding) => embedding,
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    metrics::row_skipped("cluster");
                    warn!(feedback_id = %feedback_id, error = %e, "row skipped in cluster");
                    continue;
                },
            };
            self.annotations.set_embedding(*feedback_id, &embedding).await?;

            let sentiment = self
                .annotations
                .get_for_feedback(*feedback_id)
                .await?
                .and_then(|a| a.sentiment)
                .map(opine_core::Sentiment::as_i16);

            let assigned = nearest_topic(&centroids, &embedding, SIMILARITY_THRESHOLD);
            if let Some(topic_id) = assigned {
                self.annotations.set_topic(*feedback_id, topic_id).await?;
                self.shift_centroid(&mut centroids, topic_id, &embedding).await?;
            }

            self.vector
                .upsert(VectorPoint {
                    feedback_id: *feedback_id,
                    vector: embedding,
                    topic_id: assigned,
                    sentiment,
                })
                .await?;
        }

        self.maybe_spawn_topic().await?;

        if let Some((start, end)) = self.date_window(payload).await? {
            let batch_id = match payload {
                JobPayload::Batch { batch_id } => Some(*batch_id),
                _ => None,
            };
            self.queue
                .enqueue(Job::new(QueueName::Reports, JobPayload::ReportWindow {
                    batch_id,
                    start,
                    end,
                }))
                .await?;
        }
        Ok(())
    }

    /// Pull a topic centroid toward a newly assigned embedding.
    async fn shift_centroid(
        &self,
        centroids: &mut Vec<(i64, Vec<f64>)>,
        topic_id: i64,
        embedding: &[f64],
    ) -> Result<()> {
        let count = self.topics.assignment_count(topic_id).await?.max(1);
        if let Some((_, centroid)) = centroids.iter_mut().find(|(id, _)| *id == topic_id) {
            if centroid.len() == embedding.len() {
                for (c, e) in centroid.iter_mut().zip(embedding.iter()) {
                    *c += (e - *c) / count as f64;
                }
                self.topics.update_centroid(topic_id, centroid).await?;
            }
        }
        Ok(())
    }

    /// Spawn a topic from the unassigned pool once it is large enough.
    async fn maybe_spawn_topic(&self) -> Result<()> {
        let pool_size = self.annotations.unassigned_pool_size().await?;
        if pool_size < UNASSIGNED_POOL_THRESHOLD {
            return Ok(());
        }

        let members = self.annotations.unassigned_pool(POOL_SAMPLE_LIMIT).await?;
        if members.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = members.iter().map(|(id, _)| *id).collect();
        let texts: Vec<String> = self
            .feedback
            .bodies_for_ids(&ids)
            .await?
            .into_iter()
            .map(|(_, text)| text)
            .collect();

        let keywords = top_keywords(&texts, 5);
        let label = synthesize_label(&keywords);
        let centroid = mean_vector(members.iter().map(|(_, v)| v.as_slice()));

        let topic = self
            .topics
            .create(&label, &keywords, centroid.as_deref())
            .await?;
        info!(topic_id = topic.id, label = %topic.label, members = members.len(), "topic spawned from pool");

        for (feedback_id, embedding) in members {
            self.annotations.set_topic(feedback_id, topic.id).await?;
            let sentiment = self
                .annotations
                .get_for_feedback(feedback_id)
                .await?
                .and_then(|a| a.sentiment)
                .map(opine_core::Sentiment::as_i16);
            self.vector
                .upsert(VectorPoint {
                    feedback_id,
                    vector: embedding,
                    topic_id: Some(topic.id),
                    sentiment,
                })
                .await?;
        }
        Ok(())
    }

    /// Reports stage: invalidate, refresh, mark complete.
    async fn run_reports(&self, payload: &JobPayload) -> Result<()> {
        let JobPayload::ReportWindow { batch_id, start, end } = payload else {
            return Err(OpineError::validation("reports stage requires a window payload"));
        };

        // Keys are parameter hashes, so a covered window cannot be read
        // back off a key; invalidation clears the analytics prefix.
        self.cache.delete_prefix(ANALYTICS_KEY_PREFIX).await;
        matview::refresh_daily_aggregates(&self.pool).await?;

        if let Some(batch_id) = batch_id {
            let newly_completed = self.batches.mark_completed(*batch_id).await?;
            if newly_completed {
                info!(batch_id = %batch_id, start = %start, end = %end, "batch enrichment complete");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobProcessor for StageContext {
    async fn process(&self, job: &Job) -> Result<()> {
        match job.queue {
            QueueName::Ingest => self.run_ingest(&job.payload).await,
            QueueName::Annotate => self.run_annotate(&job.payload).await,
            QueueName::Cluster => self.run_cluster(&job.payload).await,
            QueueName::Reports => self.run_reports(&job.payload).await,
        }
    }
}

/// Nearest topic centroid at or above the similarity threshold.
#[must_use]
pub fn nearest_topic(
    centroids: &[(i64, Vec<f64>)],
    embedding: &[f64],
    threshold: f64,
) -> Option<i64> {
    let mut best: Option<(i64, f64)> = None;
    for (topic_id, centroid) in centroids {
        let similarity = cosine_similarity(centroid, embedding);
        if similarity >= threshold && best.map_or(true, |(_, s)| similarity > s) {
            best = Some((*topic_id, similarity));
        }
    }
    best.map(|(topic_id, _)| topic_id)
}

/// Element-wise mean of equal-length vectors; `None` when empty.
fn mean_vector<'a>(vectors: impl Iterator<Item = &'a [f64]>) -> Option<Vec<f64>> {
    let mut sum: Option<Vec<f64>> = None;
    let mut count = 0usize;
    for vector in vectors {
        match &mut sum {
            Some(sum) if sum.len() == vector.len() => {
                for (s, v) in sum.iter_mut().zip(vector.iter()) {
                    *s += v;
                }
            },
            Some(_) => continue,
            None => sum = Some(vector.to_vec()),
        }
        count += 1;
    }
    sum.map(|mut sum| {
        for value in &mut sum {
            *value /= count as f64;
        }
        sum
    })
}

/// Log a dead-lettered job loudly enough for an operator to notice.
pub fn notify_dead_letter(job: &Job) {
    error!(
        job_id = %job.id,
        queue = %job.queue,
        attempts = job.attempt,
        last_error = job.last_error.as_deref().unwrap_or("unknown"),
        "job moved to dead letter queue"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_topic_above_threshold() {
        let centroids = vec![
            (1, vec![1.0, 0.0]),
            (2, vec![0.0, 1.0]),
        ];
        assert_eq!(nearest_topic(&centroids, &[0.9, 0.1], 0.55), Some(1));
        assert_eq!(nearest_topic(&centroids, &[0.1, 0.9], 0.55), Some(2));
    }

    #[test]
    fn test_nearest_topic_below_threshold() {
        let centroids = vec![(1, vec![1.0, 0.0])];
        // Orthogonal vector: similarity 0, below any useful threshold.
        assert_eq!(nearest_topic(&centroids, &[0.0, 1.0], 0.55), None);
        assert_eq!(nearest_topic(&[], &[1.0, 0.0], 0.55), None);
    }

    #[test]
    fn test_nearest_topic_prefers_closest() {
        let centroids = vec![
            (1, vec![1.0, 0.0]),
            (2, vec![0.8, 0.6]),
        ];
        assert_eq!(nearest_topic(&centroids, &[0.81, 0.59], 0.55), Some(2));
    }

    #[test]
    fn test_mean_vector() {
        let vectors = [vec![1.0, 3.0], vec![3.0, 5.0]];
        let mean = mean_vector(vectors.iter().map(Vec::as_slice)).expect("mean");
        assert_eq!(mean, vec![2.0, 4.0]);

        assert!(mean_vector(std::iter::empty::<&[f64]>()).is_none());
    }
}
