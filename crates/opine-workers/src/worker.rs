//! Worker pool: bounded consumers per queue with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opine_error::Result;
use opine_queue::{Job, JobQueue, JobState, QueueName};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics;
use crate::stages::{notify_dead_letter, STAGE_VISIBILITY_TIMEOUT};

/// Idle wait between polls when a queue is empty.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Wait after a queue backend error before polling again.
const BACKEND_ERROR_INTERVAL: Duration = Duration::from_secs(1);

/// Margin subtracted from the visibility timeout for the per-job deadline,
/// so a slow job fails before its message becomes redeliverable.
const JOB_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// A unit of work the pool knows how to run.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process one job to completion.
    ///
    /// # Errors
    ///
    /// Returns an error to trigger retry/dead-letter handling.
    async fn process(&self, job: &Job) -> Result<()>;
}

/// A pool of consumers, `workers_per_queue` tasks per named queue.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    workers_per_queue: usize,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool; call [`WorkerPool::start`] to spawn the consumers.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        processor: Arc<dyn JobProcessor>,
        workers_per_queue: usize,
    ) -> Self {
        Self {
            queue,
            processor,
            workers_per_queue,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn the consumer tasks.
    pub fn start(&mut self) {
        for queue_name in QueueName::ALL {
            for worker_idx in 0..self.workers_per_queue {
                let queue = Arc::clone(&self.queue);
                let processor = Arc::clone(&self.processor);
                let token = self.token.clone();
                self.handles.push(tokio::spawn(async move {
                    worker_loop(queue, processor, queue_name, worker_idx, token).await;
                }));
            }
        }
    }

    /// Signal shutdown and wait for in-flight jobs to finish.
    ///
    /// A running job is never aborted mid-transaction; the loop only exits
    /// between jobs.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task join failed");
            }
        }
    }
}

async fn worker_loop(
    queue: Arc<dyn JobQueue>,
    processor: Arc<dyn JobProcessor>,
    queue_name: QueueName,
    worker_idx: usize,
    token: CancellationToken,
) {
    debug!(queue = %queue_name, worker_idx, "worker started");
    loop {
        if token.is_cancelled() {
            break;
        }
        let worked = tokio::select! {
            () = token.cancelled() => break,
            result = process_next(&*queue, &*processor, queue_name) => match result {
                Ok(worked) => worked,
                Err(e) => {
                    warn!(queue = %queue_name, error = %e, "queue backend error");
                    tokio::time::sleep(BACKEND_ERROR_INTERVAL).await;
                    continue;
                },
            },
        };
        if !worked {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
    debug!(queue = %queue_name, worker_idx, "worker stopped");
}

/// Dequeue and process one job. Returns false when the queue was empty.
async fn process_next(
    queue: &dyn JobQueue,
    processor: &dyn JobProcessor,
    queue_name: QueueName,
) -> Result<bool> {
    let Some(mut job) = queue.dequeue(queue_name, STAGE_VISIBILITY_TIMEOUT).await? else {
        // Idle moment: return crashed workers' jobs and elapsed backoffs
        // to the pending queue.
        queue.reclaim_expired(queue_name).await?;
        return Ok(false);
    };

    let deadline = STAGE_VISIBILITY_TIMEOUT.saturating_sub(JOB_TIMEOUT_MARGIN);
    let outcome = tokio::time::timeout(deadline, processor.process(&job)).await;

    match outcome {
        Ok(Ok(())) => {
            queue.acknowledge(queue_name, job.id).await?;
            metrics::job_completed(queue_name.as_str());
        },
        Ok(Err(e)) => {
            metrics::job_failed(queue_name.as_str());
            queue.fail(&mut job, e.to_string()).await?;
            if job.state == JobState::DeadLettered {
                metrics::job_dead_lettered(queue_name.as_str());
                notify_dead_letter(&job);
            }
        },
        Err(_) => {
            metrics::job_failed(queue_name.as_str());
            let message = format!("job exceeded {}s deadline", deadline.as_secs());
            queue.fail(&mut job, message).await?;
            if job.state == JobState::DeadLettered {
                metrics::job_dead_lettered(queue_name.as_str());
                notify_dead_letter(&job);
            }
        },
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opine_error::OpineError;
    use opine_queue::{JobPayload, MemoryJobQueue};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct OkProcessor {
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobProcessor for OkProcessor {
        async fn process(&self, _job: &Job) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailProcessor;

    #[async_trait]
    impl JobProcessor for FailProcessor {
        async fn process(&self, _job: &Job) -> Result<()> {
            Err(OpineError::validation("always fails"))
        }
    }

    fn batch_job(queue: QueueName) -> Job {
        Job::new(queue, JobPayload::Batch {
            batch_id: Uuid::new_v4(),
        })
    }

    #[tokio::test]
    async fn test_pool_processes_and_acknowledges() {
        let queue = Arc::new(MemoryJobQueue::new());
        let processor = Arc::new(OkProcessor {
            calls: AtomicU32::new(0),
        });

        let job = batch_job(QueueName::Annotate);
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        let mut pool = WorkerPool::new(
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&processor) as Arc<dyn JobProcessor>,
            1,
        );
        pool.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.shutdown().await;

        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.job(job_id).expect("job").state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_job_reaches_dlq() {
        let queue = Arc::new(MemoryJobQueue::new());

        let mut job = batch_job(QueueName::Cluster);
        job.max_attempts = 1;
        queue.enqueue(job).await.expect("enqueue");

        let mut pool = WorkerPool::new(
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::new(FailProcessor),
            1,
        );
        pool.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.shutdown().await;

        assert_eq!(queue.dlq_size(QueueName::Cluster).await.expect("dlq"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt_when_idle() {
        let queue = Arc::new(MemoryJobQueue::new());
        let mut pool = WorkerPool::new(
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::new(FailProcessor),
            2,
        );
        pool.start();

        let started = std::time::Instant::now();
        pool.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
