//! The ingress `Query` algorithm: mint a job, bind a replica, enqueue,
//! cooperatively poll for a completion, and always settle the books.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::common::{new_job_id, AppError, Job};
use crate::config::Config;
use crate::kernel::{CompletionStore, LoadAccount, QueueBroker, Q_ENC, Q_LLM};
use crate::policy::{build_state, Normalization, PolicyService, SystemObservation};

pub struct Orchestrator {
    queue: Arc<dyn QueueBroker>,
    completions: Arc<dyn CompletionStore>,
    load: Arc<dyn LoadAccount>,
    policy: Arc<PolicyService>,
    config: Arc<Config>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub job_id: Uuid,
    pub answer: String,
    pub latency_ms: u64,
    pub selected_replica: usize,
}

/// Decrements `load:<replica>` exactly once, even if the caller returns
/// early via `?` or panics. The decrement itself is async (it may hit
/// Redis), so `Drop` spawns it rather than awaiting it directly.
struct LoadGuard {
    load: Arc<dyn LoadAccount>,
    replica: usize,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let load = self.load.clone();
        let replica = self.replica;
        tokio::spawn(async move {
            if let Err(e) = load.decr(replica).await {
                tracing::error!(replica, error = %e, "failed to decrement load counter");
            }
        });
    }
}

impl Orchestrator {
    pub fn new(
        queue: Arc<dyn QueueBroker>,
        completions: Arc<dyn CompletionStore>,
        load: Arc<dyn LoadAccount>,
        policy: Arc<PolicyService>,
        config: Arc<Config>,
    ) -> Self {
        Self { queue, completions, load, policy, config }
    }

    pub async fn query(&self, text: String) -> Result<QueryResult, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::BadInput("query text must not be empty".to_string()));
        }

        let job_id = new_job_id();
        let start = Instant::now();

        let observation = self.observe().await;
        let state = build_state(
            &observation,
            Normalization { load_capacity_cap: self.config.load_capacity_cap as f64 },
        );

        let replica = match self.policy.select(&state, &mut rand::thread_rng()) {
            Ok(replica) => replica,
            Err(e) => {
                tracing::warn!(error = %e, "policy unavailable, falling back to least-loaded heuristic");
                self.least_loaded_replica().await?
            }
        };

        self.load.incr(replica).await?;
        let _guard = LoadGuard { load: self.load.clone(), replica };

        let job = Job::new(job_id, text, replica);
        if let Err(e) = self.queue.enqueue(Q_ENC, &job).await {
            return Err(AppError::UpstreamUnavailable(e.to_string()));
        }

        let outcome = self.await_completion(job_id).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let success = outcome.is_ok();

        let post_loads = self.current_loads().await;
        self.policy.record(state, replica, latency_ms, success, &post_loads);

        outcome.map(|answer| QueryResult { job_id, answer, latency_ms, selected_replica: replica })
    }

    async fn await_completion(&self, job_id: Uuid) -> Result<String, AppError> {
        let deadline = tokio::time::Instant::now() + self.config.job_timeout();
        loop {
            if let Some(record) = self.completions.get(&job_id).await? {
                return if record.success {
                    Ok(record.response.unwrap_or_default())
                } else {
                    Err(AppError::GenerationFailed(record.error.unwrap_or_default()))
                };
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Timeout);
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn least_loaded_replica(&self) -> Result<usize, AppError> {
        let loads = self.current_loads().await;
        let (replica, _) = loads
            .iter()
            .enumerate()
            .fold((0usize, i64::MAX), |(best_idx, best_load), (idx, &load)| {
                if load < best_load { (idx, load) } else { (best_idx, best_load) }
            });
        Ok(replica)
    }

    async fn current_loads(&self) -> Vec<i64> {
        let mut loads = Vec::with_capacity(self.config.replica_count);
        for replica in 0..self.config.replica_count {
            loads.push(self.load.get(replica).await.unwrap_or(0));
        }
        loads
    }

    async fn observe(&self) -> SystemObservation {
        let replica_loads = self.current_loads().await;
        let queue_depth = self.queue.depth(Q_LLM).await.unwrap_or(0);
        let hour_of_day = chrono::Utc::now().format("%H").to_string().parse().unwrap_or(0);

        SystemObservation {
            replica_loads,
            queue_depth,
            recent_avg_latency_s: 0.0,
            recent_rps: 0.0,
            success_rate: 1.0,
            memory_usage: 0.0,
            cpu_usage: 0.0,
            hour_of_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{CompletionRecord, InMemoryCompletionStore, InMemoryLoadAccount, InMemoryQueue};
    use crate::policy::PolicyConfig;
    use std::time::Duration as StdDuration;

    fn test_config() -> Config {
        Config {
            redis_url: String::new(),
            embed_url: String::new(),
            llm_url: String::new(),
            vector_index_url: String::new(),
            vector_collection: "documents".to_string(),
            checkpoint_path: std::env::temp_dir().join("orch_test_checkpoint.json").to_string_lossy().to_string(),
            replica_count: 2,
            top_k: 5,
            embed_dim: 2,
            poll_interval_ms: 10,
            job_timeout_s: 1,
            llm_timeout_s: 1,
            encoder_recv_timeout_s: 1,
            batch_size: 64,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            target_sync_steps: 100,
            checkpoint_steps: 500,
            buffer_capacity: 100,
            learning_rate: 1e-3,
            load_capacity_cap: 10.0,
            port: 0,
        }
    }

    fn test_policy_config(config: &Config) -> PolicyConfig {
        PolicyConfig {
            action_count: config.replica_count,
            gamma: config.gamma,
            epsilon_start: config.epsilon_start,
            epsilon_end: config.epsilon_end,
            epsilon_decay: config.epsilon_decay,
            target_sync_steps: config.target_sync_steps,
            checkpoint_steps: config.checkpoint_steps,
            buffer_capacity: config.buffer_capacity,
            learning_rate: config.learning_rate,
            checkpoint_path: std::path::PathBuf::from(&config.checkpoint_path),
        }
    }

    #[tokio::test]
    async fn query_times_out_when_nothing_ever_completes_it() {
        let config = Arc::new(test_config());
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let load = Arc::new(InMemoryLoadAccount::new());
        let policy = Arc::new(PolicyService::new(test_policy_config(&config), 1));

        let orchestrator = Orchestrator::new(queue, completions, load, policy, config);
        let err = orchestrator.query("hello".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout));
    }

    #[tokio::test]
    async fn query_returns_answer_once_a_completion_record_appears() {
        let config = Arc::new(test_config());
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let load = Arc::new(InMemoryLoadAccount::new());
        let policy = Arc::new(PolicyService::new(test_policy_config(&config), 1));

        let writer_completions = completions.clone();
        let writer_queue = queue.clone();
        tokio::spawn(async move {
            loop {
                if let Some(job) = writer_queue.dequeue(Q_ENC, StdDuration::from_millis(20)).await.unwrap() {
                    let record = CompletionRecord::success("42".to_string(), "gen-0".to_string(), 5);
                    writer_completions.put(&job.job_id, &record, StdDuration::from_secs(5)).await.unwrap();
                    return;
                }
            }
        });

        let orchestrator = Orchestrator::new(queue, completions, load, policy, config);
        let result = orchestrator.query("hello".to_string()).await.unwrap();
        assert_eq!(result.answer, "42");
    }

    #[tokio::test]
    async fn empty_query_text_is_rejected_before_any_dispatch() {
        let config = Arc::new(test_config());
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let load = Arc::new(InMemoryLoadAccount::new());
        let policy = Arc::new(PolicyService::new(test_policy_config(&config), 1));

        let orchestrator = Orchestrator::new(queue, completions, load, policy, config);
        let err = orchestrator.query("   ".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[tokio::test]
    async fn load_counter_returns_to_zero_after_a_completed_query() {
        let config = Arc::new(test_config());
        let queue = Arc::new(InMemoryQueue::new());
        let completions = Arc::new(InMemoryCompletionStore::new());
        let load = Arc::new(InMemoryLoadAccount::new());
        let policy = Arc::new(PolicyService::new(test_policy_config(&config), 1));

        let orchestrator = Orchestrator::new(queue, completions, load.clone(), policy, config);
        let _ = orchestrator.query("hello".to_string()).await;

        // The guard's decrement is spawned, not awaited; give it a moment.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        for replica in 0..2 {
            assert_eq!(load.get(replica).await.unwrap(), 0);
        }
    }
}
