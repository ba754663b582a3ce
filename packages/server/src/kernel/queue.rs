//! FIFO job queue abstraction.
//!
//! Production traffic rides Redis lists (`LPUSH`/`BRPOP`); tests swap in
//! `InMemoryQueue`. Trait-based swapping here mirrors the teacher's
//! `NatsPublisher`/`TestNats` split in `kernel/nats.rs`, generalized from a
//! fire-and-forget publish to a real FIFO pop since the pipeline needs one.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::common::{AppError, Job};

/// Trait for the three pipeline queues (`Q_enc`, `Q_ret`, `Q_llm`).
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Push a Job onto the tail of `queue`.
    async fn enqueue(&self, queue: &str, job: &Job) -> Result<(), AppError>;

    /// Pop a Job from the head of `queue`, waiting up to `timeout` for one to
    /// arrive. Returns `None` on timeout (not an error) so workers can loop
    /// back and check for shutdown.
    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Job>, AppError>;

    /// Current length of `queue`, used as a feature in the RL state vector.
    async fn depth(&self, queue: &str) -> Result<usize, AppError>;
}

/// Redis-backed broker: `LPUSH` to enqueue, `BRPOP` to dequeue.
pub struct RedisQueueBroker {
    client: redis::Client,
}

impl RedisQueueBroker {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl QueueBroker for RedisQueueBroker {
    async fn enqueue(&self, queue: &str, job: &Job) -> Result<(), AppError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| AppError::BadInput(format!("job did not serialize: {e}")))?;
        let mut conn = self.connection().await?;
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Job>, AppError> {
        let mut conn = self.connection().await?;
        let timeout_s = timeout.as_secs().max(1);
        let result: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(timeout_s)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))?;

        match result {
            None => Ok(None),
            Some((_, payload)) => {
                let job = serde_json::from_str(&payload)
                    .map_err(|e| AppError::BadInput(format!("malformed job payload: {e}")))?;
                Ok(Some(job))
            }
        }
    }

    async fn depth(&self, queue: &str) -> Result<usize, AppError> {
        let mut conn = self.connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::BackendFailure(e.to_string()))?;
        Ok(len)
    }
}

/// In-memory FIFO broker used by tests and single-process demos. Mirrors the
/// teacher's `TestNats`: a plain mutex-guarded buffer plus inspection helpers.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<std::collections::HashMap<String, VecDeque<Job>>>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently buffered on `queue` (used by the RL state
    /// vector's queue-depth feature in tests).
    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueBroker for InMemoryQueue {
    async fn enqueue(&self, queue: &str, job: &Job) -> Result<(), AppError> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(queue.to_string())
            .or_default()
            .push_back(job.clone());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<Job>, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self
                .queues
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(queue)
                .and_then(|q| q.pop_front())
            {
                return Ok(Some(job));
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn depth(&self, queue: &str) -> Result<usize, AppError> {
        Ok(self.len(queue))
    }
}
