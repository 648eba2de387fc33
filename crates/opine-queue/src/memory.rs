//! In-process job queue.
//!
//! Used in tests and in deployments without a queue URL. Semantics match
//! the Redis backend: FIFO pending lists, a parked set with deadlines, and
//! a DLQ per queue.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opine_error::{OpineError, Result};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::backoff::retry_delay;
use crate::{Job, JobQueue, JobState, QueueName};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Uuid>,
    /// Job id -> deadline after which it is reclaimed into pending.
    parked: HashMap<Uuid, DateTime<Utc>>,
    dlq: Vec<Uuid>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    queues: HashMap<QueueName, QueueState>,
}

/// In-memory job queue with visibility-timeout semantics.
#[derive(Default)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a job snapshot by id (test observability).
    #[must_use]
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.lock().jobs.get(&job_id).cloned()
    }

    /// Dead-lettered jobs for a queue (test observability).
    #[must_use]
    pub fn dlq_jobs(&self, queue: QueueName) -> Vec<Job> {
        let inner = self.inner.lock();
        inner
            .queues
            .get(&queue)
            .map(|q| {
                q.dlq
                    .iter()
                    .filter_map(|id| inner.jobs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        let inner = &mut *self.inner.lock();
        let queue = inner.queues.entry(job.queue).or_default();
        queue.pending.push_back(job.id);
        inner.jobs.insert(job.id, job);
        Ok(())
    }

    async fn dequeue(&self, queue: QueueName, visibility_timeout: Duration) -> Result<Option<Job>> {
        let inner = &mut *self.inner.lock();
        let state = inner.queues.entry(queue).or_default();
        let Some(job_id) = state.pending.pop_front() else {
            return Ok(None);
        };
        let deadline = Utc::now()
            + chrono::Duration::milliseconds(
                i64::try_from(visibility_timeout.as_millis()).unwrap_or(i64::MAX),
            );
        state.parked.insert(job_id, deadline);

        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| OpineError::internal(format!("job {job_id} missing from store")))?;
        job.mark_running();
        Ok(Some(job.clone()))
    }

    async fn acknowledge(&self, queue: QueueName, job_id: Uuid) -> Result<()> {
        let inner = &mut *self.inner.lock();
        if let Some(state) = inner.queues.get_mut(&queue) {
            state.parked.remove(&job_id);
        }
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.mark_completed();
        }
        Ok(())
    }

    async fn fail(&self, job: &mut Job, error: String) -> Result<()> {
        let inner = &mut *self.inner.lock();
        let state = inner.queues.entry(job.queue).or_default();
        state.parked.remove(&job.id);

        job.mark_failed(error);
        if job.state == JobState::Pending {
            // Park behind the retry backoff; reclaim_expired releases it.
            let delay = retry_delay(job.attempt.saturating_sub(1));
            let deadline = Utc::now()
                + chrono::Duration::milliseconds(
                    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
                );
            state.parked.insert(job.id, deadline);
        } else {
            job.mark_dead_lettered();
            state.dlq.push(job.id);
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn reclaim_expired(&self, queue: QueueName) -> Result<usize> {
        let inner = &mut *self.inner.lock();
        let now = Utc::now();
        let state = inner.queues.entry(queue).or_default();

        let due: Vec<Uuid> = state
            .parked
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            state.parked.remove(id);
            state.pending.push_back(*id);
        }
        let count = due.len();
        for id in due {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.state = JobState::Pending;
            }
        }
        Ok(count)
    }

    async fn queue_depth(&self, queue: QueueName) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .queues
            .get(&queue)
            .map_or(0, |q| q.pending.len()))
    }

    async fn dlq_size(&self, queue: QueueName) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .queues
            .get(&queue)
            .map_or(0, |q| q.dlq.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobPayload;

    fn batch_job(queue: QueueName) -> Job {
        Job::new(queue, JobPayload::Batch {
            batch_id: Uuid::new_v4(),
        })
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_fifo() {
        let queue = MemoryJobQueue::new();
        let first = batch_job(QueueName::Annotate);
        let second = batch_job(QueueName::Annotate);
        let first_id = first.id;
        let second_id = second.id;

        queue.enqueue(first).await.expect("enqueue");
        queue.enqueue(second).await.expect("enqueue");
        assert_eq!(queue.queue_depth(QueueName::Annotate).await.expect("depth"), 2);

        let a = queue
            .dequeue(QueueName::Annotate, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .expect("job");
        let b = queue
            .dequeue(QueueName::Annotate, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .expect("job");
        assert_eq!(a.id, first_id);
        assert_eq!(b.id, second_id);
        assert_eq!(a.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(batch_job(QueueName::Ingest)).await.expect("enqueue");

        assert!(queue
            .dequeue(QueueName::Cluster, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .is_none());
        assert!(queue
            .dequeue(QueueName::Ingest, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .is_some());
    }

    #[tokio::test]
    async fn test_acknowledge_completes() {
        let queue = MemoryJobQueue::new();
        let job = batch_job(QueueName::Reports);
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        let dequeued = queue
            .dequeue(QueueName::Reports, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .expect("job");
        queue
            .acknowledge(QueueName::Reports, dequeued.id)
            .await
            .expect("ack");

        assert_eq!(queue.job(job_id).expect("job").state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_unacknowledged_job_is_redelivered() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(batch_job(QueueName::Annotate)).await.expect("enqueue");

        // Zero visibility: the job expires immediately.
        let job = queue
            .dequeue(QueueName::Annotate, Duration::from_millis(0))
            .await
            .expect("dequeue")
            .expect("job");
        assert!(queue
            .dequeue(QueueName::Annotate, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .is_none());

        let reclaimed = queue
            .reclaim_expired(QueueName::Annotate)
            .await
            .expect("reclaim");
        assert_eq!(reclaimed, 1);

        let redelivered = queue
            .dequeue(QueueName::Annotate, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .expect("job");
        assert_eq!(redelivered.id, job.id);
    }

    #[tokio::test]
    async fn test_fail_then_retry_after_backoff() {
        let queue = MemoryJobQueue::new();
        let job = batch_job(QueueName::Cluster);
        queue.enqueue(job).await.expect("enqueue");

        let mut job = queue
            .dequeue(QueueName::Cluster, Duration::from_secs(120))
            .await
            .expect("dequeue")
            .expect("job");
        queue
            .fail(&mut job, "model endpoint 503".to_string())
            .await
            .expect("fail");

        assert_eq!(job.attempt, 2);
        assert_eq!(queue.dlq_size(QueueName::Cluster).await.expect("dlq"), 0);
        // Parked behind backoff, not yet pending.
        assert_eq!(queue.queue_depth(QueueName::Cluster).await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn test_exhausted_job_dead_letters() {
        let queue = MemoryJobQueue::new();
        let mut job = batch_job(QueueName::Annotate);
        job.attempt = job.max_attempts;
        queue.enqueue(job.clone()).await.expect("enqueue");

        queue
            .fail(&mut job, "permanently broken".to_string())
            .await
            .expect("fail");

        assert_eq!(queue.dlq_size(QueueName::Annotate).await.expect("dlq"), 1);
        let dlq = queue.dlq_jobs(QueueName::Annotate);
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].state, JobState::DeadLettered);
    }
}
