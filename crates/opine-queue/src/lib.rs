//! Job queue system for the enrichment pipeline.
//!
//! Four named queues (`ingest`, `annotate`, `cluster`, `reports`) with
//! FIFO delivery per producer, at-least-once semantics, per-message
//! visibility timeouts, and a dead letter queue per queue.
//!
//! # Architecture
//!
//! Jobs flow through three states:
//! 1. **Pending**: waiting to execute (queue list)
//! 2. **Running**: dequeued, invisible until its visibility deadline
//! 3. **Completed/Failed/DeadLettered**: terminal states
//!
//! A job dequeued but not acknowledged before its deadline is redelivered
//! by [`JobQueue::reclaim_expired`]. Retry backoff reuses the same
//! mechanism: a failed-but-retryable job parks behind a backoff deadline
//! and is reclaimed into pending when it elapses.

pub mod backoff;
mod memory;
mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use opine_error::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryJobQueue;
pub use redis_backend::RedisJobQueue;

/// Attempt cap before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default per-message visibility timeout.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);

/// The four named queues of the enrichment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Raw-upload notifications.
    Ingest,
    /// Sentiment/toxicity annotation.
    Annotate,
    /// Embedding and topic assignment.
    Cluster,
    /// Cache invalidation and materialised-view refresh.
    Reports,
}

impl QueueName {
    /// All queues, in pipeline order.
    pub const ALL: [Self; 4] = [Self::Ingest, Self::Annotate, Self::Cluster, Self::Reports];

    /// Queue name on the wire and in Redis keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Annotate => "annotate",
            Self::Cluster => "cluster",
            Self::Reports => "reports",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// A batch identifier (ingest, annotate, cluster stages).
    Batch {
        /// The batch to process.
        batch_id: Uuid,
    },
    /// Explicit feedback identifiers (single-item ingest path).
    Feedback {
        /// The feedback rows to process.
        feedback_ids: Vec<Uuid>,
    },
    /// A date window (reports stage).
    ReportWindow {
        /// Batch whose completion this report covers, when one exists.
        batch_id: Option<Uuid>,
        /// First day touched by the batch.
        start: NaiveDate,
        /// Last day touched by the batch.
        end: NaiveDate,
    },
}

/// Job state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to execute.
    Pending,
    /// Currently executing (invisible until the visibility deadline).
    Running,
    /// Successfully executed.
    Completed,
    /// Attempts exhausted.
    Failed,
    /// Moved to the DLQ after permanent failure.
    DeadLettered,
}

impl JobState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DeadLettered)
    }
}

/// Job to be executed asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: Uuid,

    /// Queue this job belongs to.
    pub queue: QueueName,

    /// Typed payload.
    pub payload: JobPayload,

    /// When this job was created.
    pub created_at: DateTime<Utc>,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum number of attempts.
    pub max_attempts: u32,

    /// Current state.
    pub state: JobState,

    /// Error message from the last failure, if any.
    pub last_error: Option<String>,
}

impl Job {
    /// Create a pending job with the default attempt cap.
    #[must_use]
    pub fn new(queue: QueueName, payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
            payload,
            created_at: Utc::now(),
            attempt: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: JobState::Pending,
            last_error: None,
        }
    }

    /// Check if this job has attempts left.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Mark the job as running.
    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
    }

    /// Mark the job as completed.
    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
    }

    /// Mark the job as failed, incrementing the attempt counter when a
    /// retry remains.
    pub fn mark_failed(&mut self, error: String) {
        self.last_error = Some(error);
        if self.can_retry() {
            self.state = JobState::Pending;
            self.attempt += 1;
        } else {
            self.state = JobState::Failed;
        }
    }

    /// Mark the job as dead-lettered.
    pub fn mark_dead_lettered(&mut self) {
        self.state = JobState::DeadLettered;
    }
}

/// Job queue trait for asynchronous pipeline execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job on its queue.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the write.
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Dequeue one job, making it invisible for `visibility_timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend read fails.
    async fn dequeue(&self, queue: QueueName, visibility_timeout: Duration) -> Result<Option<Job>>;

    /// Acknowledge successful completion.
    ///
    /// # Errors
    ///
    /// Returns error if the backend write fails.
    async fn acknowledge(&self, queue: QueueName, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed, scheduling a retry or dead-lettering it.
    ///
    /// # Errors
    ///
    /// Returns error if the backend write fails.
    async fn fail(&self, job: &mut Job, error: String) -> Result<()>;

    /// Return past-deadline jobs to the pending queue.
    ///
    /// Covers both expired visibility timeouts (worker crashed mid-job) and
    /// elapsed retry backoffs.
    ///
    /// # Errors
    ///
    /// Returns error if the backend scan fails.
    async fn reclaim_expired(&self, queue: QueueName) -> Result<usize>;

    /// Number of pending jobs.
    ///
    /// # Errors
    ///
    /// Returns error if the backend read fails.
    async fn queue_depth(&self, queue: QueueName) -> Result<usize>;

    /// Number of dead-lettered jobs.
    ///
    /// # Errors
    ///
    /// Returns error if the backend read fails.
    async fn dlq_size(&self, queue: QueueName) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_job(queue: QueueName) -> Job {
        Job::new(queue, JobPayload::Batch {
            batch_id: Uuid::new_v4(),
        })
    }

    #[test]
    fn test_job_creation_defaults() {
        let job = batch_job(QueueName::Annotate);
        assert_eq!(job.attempt, 1);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.state, JobState::Pending);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_job_mark_failed_with_retry() {
        let mut job = batch_job(QueueName::Cluster);
        job.mark_failed("connection timeout".to_string());

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.last_error.as_deref(), Some("connection timeout"));
    }

    #[test]
    fn test_job_mark_failed_exhausted() {
        let mut job = batch_job(QueueName::Reports);
        job.attempt = job.max_attempts;
        job.mark_failed("still broken".to_string());

        assert_eq!(job.state, JobState::Failed);
        assert!(!job.can_retry());
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::DeadLettered.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_payload_serialization() {
        let job = Job::new(QueueName::Reports, JobPayload::ReportWindow {
            batch_id: Some(Uuid::new_v4()),
            start:    "2024-01-01".parse().expect("date"),
            end:      "2024-01-14".parse().expect("date"),
        });

        let json = serde_json::to_string(&job).expect("serialize");
        let back: Job = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.id, job.id);
        assert_eq!(back.payload, job.payload);
        assert_eq!(back.queue, QueueName::Reports);
    }

    #[test]
    fn test_queue_name_strings() {
        assert_eq!(QueueName::Ingest.as_str(), "ingest");
        assert_eq!(QueueName::Annotate.as_str(), "annotate");
        assert_eq!(QueueName::Cluster.as_str(), "cluster");
        assert_eq!(QueueName::Reports.as_str(), "reports");
    }
}
