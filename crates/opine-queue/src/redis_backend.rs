//! Redis-backed distributed job queue.
//!
//! Uses three Redis data structures per named queue:
//! - `opine:{queue}:pending` - list of jobs waiting to execute (FIFO)
//! - `opine:{queue}:processing` - sorted set of in-flight jobs, scored by
//!   their visibility deadline in epoch milliseconds
//! - `opine:{queue}:dlq` - list of permanently failed jobs
//!
//! Job bodies live under `opine:job:{id}`. Retry backoff parks the job in
//! the processing set behind its backoff deadline; `reclaim_expired` moves
//! past-deadline members (crashed workers and elapsed backoffs alike) back
//! to pending.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use opine_error::{OpineError, Result};
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::backoff::retry_delay;
use crate::{Job, JobQueue, JobState, QueueName};

/// Redis-backed job queue.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    /// Connect to the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Unavailable` when the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| OpineError::unavailable("queue", e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| OpineError::unavailable("queue", e.to_string()))?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn pending_key(queue: QueueName) -> String {
        format!("opine:{queue}:pending")
    }

    fn processing_key(queue: QueueName) -> String {
        format!("opine:{queue}:processing")
    }

    fn dlq_key(queue: QueueName) -> String {
        format!("opine:{queue}:dlq")
    }

    fn job_key(job_id: Uuid) -> String {
        format!("opine:job:{job_id}")
    }

    async fn store_job(&self, job: &Job) -> Result<()> {
        let json = serde_json::to_string(job)?;
        redis::cmd("SET")
            .arg(Self::job_key(job.id))
            .arg(json)
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let json: Option<String> = redis::cmd("GET")
            .arg(Self::job_key(job_id))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(queue_err)?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Park a job in the processing set until `deadline_ms`.
    async fn park(&self, queue: QueueName, job_id: Uuid, deadline_ms: f64) -> Result<()> {
        redis::cmd("ZADD")
            .arg(Self::processing_key(queue))
            .arg(deadline_ms)
            .arg(job_id.to_string())
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }

    async fn unpark(&self, queue: QueueName, job_id: Uuid) -> Result<()> {
        redis::cmd("ZREM")
            .arg(Self::processing_key(queue))
            .arg(job_id.to_string())
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }
}

fn queue_err(e: redis::RedisError) -> OpineError {
    OpineError::unavailable("queue", e.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn deadline_after(delay: Duration) -> f64 {
    (Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64)).timestamp_millis()
        as f64
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        self.store_job(&job).await?;
        redis::cmd("LPUSH")
            .arg(Self::pending_key(job.queue))
            .arg(job.id.to_string())
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }

    async fn dequeue(&self, queue: QueueName, visibility_timeout: Duration) -> Result<Option<Job>> {
        let job_id_str: Option<String> = redis::cmd("RPOP")
            .arg(Self::pending_key(queue))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(queue_err)?;

        let Some(job_id_str) = job_id_str else {
            return Ok(None);
        };
        let job_id = Uuid::parse_str(&job_id_str)
            .map_err(|e| OpineError::internal(format!("invalid job id in queue: {e}")))?;

        let Some(mut job) = self.load_job(job_id).await? else {
            // Body evicted or acked concurrently; nothing to deliver.
            return Ok(None);
        };

        self.park(queue, job_id, deadline_after(visibility_timeout))
            .await?;
        job.mark_running();
        self.store_job(&job).await?;
        Ok(Some(job))
    }

    async fn acknowledge(&self, queue: QueueName, job_id: Uuid) -> Result<()> {
        self.unpark(queue, job_id).await?;
        redis::cmd("DEL")
            .arg(Self::job_key(job_id))
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }

    async fn fail(&self, job: &mut Job, error: String) -> Result<()> {
        self.unpark(job.queue, job.id).await?;
        job.mark_failed(error);

        if job.state == JobState::Pending {
            // Park behind the retry backoff; reclaim_expired releases it.
            let delay = retry_delay(job.attempt.saturating_sub(1));
            self.store_job(job).await?;
            self.park(job.queue, job.id, deadline_after(delay)).await?;
        } else {
            job.mark_dead_lettered();
            self.store_job(job).await?;
            redis::cmd("LPUSH")
                .arg(Self::dlq_key(job.queue))
                .arg(job.id.to_string())
                .query_async::<()>(&mut self.conn.clone())
                .await
                .map_err(queue_err)?;
        }
        Ok(())
    }

    async fn reclaim_expired(&self, queue: QueueName) -> Result<usize> {
        let now_ms = Utc::now().timestamp_millis() as f64;
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(Self::processing_key(queue))
            .arg("-inf")
            .arg(now_ms)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(queue_err)?;

        let mut reclaimed = 0;
        for job_id_str in due {
            let Ok(job_id) = Uuid::parse_str(&job_id_str) else {
                continue;
            };
            self.unpark(queue, job_id).await?;
            if let Some(mut job) = self.load_job(job_id).await? {
                job.state = JobState::Pending;
                self.store_job(&job).await?;
                redis::cmd("LPUSH")
                    .arg(Self::pending_key(queue))
                    .arg(job_id.to_string())
                    .query_async::<()>(&mut self.conn.clone())
                    .await
                    .map_err(queue_err)?;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn queue_depth(&self, queue: QueueName) -> Result<usize> {
        redis::cmd("LLEN")
            .arg(Self::pending_key(queue))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }

    async fn dlq_size(&self, queue: QueueName) -> Result<usize> {
        redis::cmd("LLEN")
            .arg(Self::dlq_key(queue))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(queue_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        assert_eq!(
            RedisJobQueue::pending_key(QueueName::Annotate),
            "opine:annotate:pending"
        );
        assert_eq!(
            RedisJobQueue::processing_key(QueueName::Cluster),
            "opine:cluster:processing"
        );
        assert_eq!(RedisJobQueue::dlq_key(QueueName::Reports), "opine:reports:dlq");
        assert!(RedisJobQueue::job_key(Uuid::nil()).starts_with("opine:job:"));
    }

    #[test]
    fn test_redis_job_queue_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<RedisJobQueue>();
    }
}
