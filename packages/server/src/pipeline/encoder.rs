//! Encoder worker loop: `Q_enc` -> embed -> `Q_ret`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rag_llm_backend::BaseEmbeddingBackend;

use crate::kernel::{QueueBroker, Q_ENC, Q_RET};

/// Consumes jobs off `Q_enc` forever. Exits only when `shutdown` fires.
pub async fn run(
    queue: Arc<dyn QueueBroker>,
    embedder: Arc<dyn BaseEmbeddingBackend>,
    recv_timeout: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            tracing::info!("encoder worker shutting down");
            return;
        }

        let job = tokio::select! {
            result = queue.dequeue(Q_ENC, recv_timeout) => result,
            _ = shutdown.changed() => continue,
        };

        let mut job = match job {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to dequeue from Q_enc");
                continue;
            }
        };

        if job.text.trim().is_empty() {
            tracing::warn!(job_id = %job.job_id, "dropping job with empty text");
            continue;
        }

        let start = Instant::now();
        let embedding = match embedder.embed(&job.text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "embedding backend failed, dropping job");
                continue;
            }
        };
        let encode_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = job.set_embedding(embedding, encode_ms) {
            tracing::warn!(job_id = %job.job_id, error = %e, "dropping job that already had an embedding");
            continue;
        }

        if let Err(e) = queue.enqueue(Q_RET, &job).await {
            tracing::warn!(job_id = %job.job_id, error = %e, "failed to enqueue onto Q_ret, job will eventually time out at the ingress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Job;
    use crate::kernel::InMemoryQueue;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl BaseEmbeddingBackend for FixedEmbedder {
        async fn embed(&self, _text: &str) -> rag_llm_backend::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl BaseEmbeddingBackend for FailingEmbedder {
        async fn embed(&self, _text: &str) -> rag_llm_backend::Result<Vec<f32>> {
            Err(rag_llm_backend::BackendError::Network("down".to_string()))
        }
        fn dimension(&self) -> usize {
            384
        }
    }

    #[tokio::test]
    async fn job_moves_from_q_enc_to_q_ret_with_embedding_set() {
        let queue = Arc::new(InMemoryQueue::new());
        let embedder: Arc<dyn BaseEmbeddingBackend> = Arc::new(FixedEmbedder(vec![1.0, 0.0]));
        let (_tx, rx) = tokio::sync::watch::channel(false);

        queue
            .enqueue(Q_ENC, &Job::new(Uuid::now_v7(), "hello".to_string(), 0))
            .await
            .unwrap();

        let worker_queue = queue.clone();
        let handle = tokio::spawn(async move {
            run(worker_queue, embedder, Duration::from_millis(50), rx).await;
        });

        let forwarded = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(job) = queue.dequeue(Q_RET, Duration::from_millis(50)).await.unwrap() {
                    return job;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(forwarded.embedding, Some(vec![1.0, 0.0]));
        handle.abort();
    }

    #[tokio::test]
    async fn backend_failure_drops_the_job_without_forwarding() {
        let queue = Arc::new(InMemoryQueue::new());
        let embedder: Arc<dyn BaseEmbeddingBackend> = Arc::new(FailingEmbedder);
        let (_tx, rx) = tokio::sync::watch::channel(false);

        queue
            .enqueue(Q_ENC, &Job::new(Uuid::now_v7(), "hello".to_string(), 0))
            .await
            .unwrap();

        let worker_queue = queue.clone();
        let handle = tokio::spawn(async move {
            run(worker_queue, embedder, Duration::from_millis(50), rx).await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(queue.len(Q_RET), 0);
        handle.abort();
    }
}
