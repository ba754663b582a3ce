//! Generator worker loop: `Q_llm` -> invoke the LLM -> `completion:<job_id>`.
//! Any replica may dequeue any job; the completion record's `worker` field
//! names whichever process actually handled it (§9).

use std::sync::Arc;
use std::time::{Duration, Instant};

use rag_llm_backend::{BaseLlmBackend, GenerationOptions};

use crate::kernel::{CompletionRecord, CompletionStore, QueueBroker, Q_LLM};

pub async fn run(
    queue: Arc<dyn QueueBroker>,
    completions: Arc<dyn CompletionStore>,
    llm: Arc<dyn BaseLlmBackend>,
    worker_name: String,
    recv_timeout: Duration,
    completion_ttl: Duration,
    options: GenerationOptions,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            tracing::info!(worker = %worker_name, "generator worker shutting down");
            return;
        }

        let job = tokio::select! {
            result = queue.dequeue(Q_LLM, recv_timeout) => result,
            _ = shutdown.changed() => continue,
        };

        let job = match job {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to dequeue from Q_llm");
                continue;
            }
        };

        let Some(prompt) = job.augmented_prompt.clone() else {
            tracing::warn!(job_id = %job.job_id, "dropping job missing an augmented prompt");
            continue;
        };

        let start = Instant::now();
        let record = match llm.generate(&prompt, &options).await {
            Ok(response) => {
                let generation_time_ms = start.elapsed().as_millis() as u64;
                tracing::info!(job_id = %job.job_id, worker = %worker_name, "generation succeeded");
                CompletionRecord::success(response, worker_name.clone(), generation_time_ms)
            }
            Err(e) => {
                let generation_time_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(job_id = %job.job_id, worker = %worker_name, error = %e, "generation failed");
                CompletionRecord::failure(e.to_string(), worker_name.clone(), generation_time_ms)
            }
        };

        if let Err(e) = completions.put(&job.job_id, &record, completion_ttl).await {
            tracing::error!(job_id = %job.job_id, error = %e, "failed to write completion record, ingress will observe TIMEOUT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Job;
    use crate::kernel::{InMemoryCompletionStore, InMemoryQueue};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct EchoLlm;

    #[async_trait]
    impl BaseLlmBackend for EchoLlm {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> rag_llm_backend::Result<String> {
            Ok(format!("answer to: {prompt}"))
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl BaseLlmBackend for FailingLlm {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> rag_llm_backend::Result<String> {
            Err(rag_llm_backend::BackendError::Network("down".to_string()))
        }
    }

    fn sample_job_with_prompt() -> Job {
        let mut job = Job::new(Uuid::now_v7(), "what is rust?".to_string(), 1);
        job.set_embedding(vec![1.0], 1).unwrap();
        job.set_retrieval(vec![], "Question: what is rust?\nAnswer:".to_string(), 1).unwrap();
        job
    }

    #[tokio::test]
    async fn successful_generation_writes_a_success_completion_record() {
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let llm: Arc<dyn BaseLlmBackend> = Arc::new(EchoLlm);
        let (_tx, rx) = tokio::sync::watch::channel(false);

        let job = sample_job_with_prompt();
        let job_id = job.job_id;
        queue.enqueue(Q_LLM, &job).await.unwrap();

        let worker_completions = completions.clone();
        let handle = tokio::spawn(async move {
            run(
                queue,
                worker_completions,
                llm,
                "gen-0".to_string(),
                Duration::from_millis(50),
                Duration::from_secs(60),
                GenerationOptions::default(),
                rx,
            )
            .await;
        });

        let record = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(record) = completions.get(&job_id).await.unwrap() {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(record.success);
        assert_eq!(record.worker, "gen-0");
        handle.abort();
    }

    #[tokio::test]
    async fn llm_failure_writes_a_failure_completion_record() {
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let llm: Arc<dyn BaseLlmBackend> = Arc::new(FailingLlm);
        let (_tx, rx) = tokio::sync::watch::channel(false);

        let job = sample_job_with_prompt();
        let job_id = job.job_id;
        queue.enqueue(Q_LLM, &job).await.unwrap();

        let worker_completions = completions.clone();
        let handle = tokio::spawn(async move {
            run(
                queue,
                worker_completions,
                llm,
                "gen-1".to_string(),
                Duration::from_millis(50),
                Duration::from_secs(60),
                GenerationOptions::default(),
                rx,
            )
            .await;
        });

        let record = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(record) = completions.get(&job_id).await.unwrap() {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(!record.success);
        assert!(record.error.is_some());
        handle.abort();
    }
}
