use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;

use crate::models::CrawlJobPayload;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Redis-list job queue shared with the control plane.
///
/// The API side LPUSHes `{crawlRunId, projectId}` payloads; workers BRPOP
/// them. `jobId` equals `crawlRunId`, so queue-level idempotency falls out
/// of the wipe-on-start discipline in the store.
#[derive(Clone)]
pub struct JobQueue {
    conn: MultiplexedConnection,
    queue_key: String,
}

impl JobQueue {
    pub async fn connect(redis_url: &str, queue_key: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(JobQueue {
            conn,
            queue_key: queue_key.to_string(),
        })
    }

    /// Enqueue a job. Used by the retry path and by tooling; the control
    /// plane pushes the same shape from its side.
    pub async fn push(&self, payload: &CrawlJobPayload) -> Result<(), QueueError> {
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.queue_key, body).await?;
        Ok(())
    }

    /// Block up to `timeout_secs` waiting for the next job.
    pub async fn pop(&self, timeout_secs: f64) -> Result<Option<CrawlJobPayload>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(&self.queue_key, timeout_secs).await?;
        match popped {
            Some((_, body)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}
