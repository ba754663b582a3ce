//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Recognized options and their defaults/effects (see SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub embed_url: String,
    pub llm_url: String,
    pub vector_index_url: String,
    pub vector_collection: String,
    pub checkpoint_path: String,

    pub replica_count: usize,
    pub top_k: usize,
    pub embed_dim: usize,

    pub poll_interval_ms: u64,
    pub job_timeout_s: u64,
    pub llm_timeout_s: u64,
    pub encoder_recv_timeout_s: u64,

    pub batch_size: usize,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay: f32,
    pub target_sync_steps: u64,
    pub checkpoint_steps: u64,
    pub buffer_capacity: usize,
    pub learning_rate: f32,

    pub load_capacity_cap: f32,
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let job_timeout_s = env_parse("JOB_TIMEOUT_S", 60)?;
        let completion_ttl_s: u64 = env_parse("COMPLETION_TTL_S", 60)?;
        if completion_ttl_s != job_timeout_s {
            tracing::warn!(
                completion_ttl_s,
                job_timeout_s,
                "completion TTL and job timeout have diverged; late completions may vanish \
                 before the ingress reads them"
            );
        }

        Ok(Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            embed_url: env::var("EMBED_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            llm_url: env::var("LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8002/generate".to_string()),
            vector_index_url: env::var("VECTOR_INDEX_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            vector_collection: env::var("VECTOR_COLLECTION")
                .unwrap_or_else(|_| "documents".to_string()),
            checkpoint_path: env::var("CHECKPOINT_PATH")
                .unwrap_or_else(|_| "./data/policy_checkpoint.json".to_string()),

            replica_count: env_parse("REPLICA_COUNT", 3)?,
            top_k: env_parse("TOP_K", 5)?,
            embed_dim: env_parse("EMBED_DIM", 384)?,

            poll_interval_ms: env_parse("POLL_INTERVAL_MS", 250)?,
            job_timeout_s,
            llm_timeout_s: env_parse("LLM_TIMEOUT_S", 30)?,
            encoder_recv_timeout_s: env_parse("ENCODER_RECV_TIMEOUT_S", 5)?,

            batch_size: env_parse("BATCH_SIZE", 64)?,
            gamma: env_parse("GAMMA", 0.99)?,
            epsilon_start: env_parse("EPSILON_START", 1.0)?,
            epsilon_end: env_parse("EPSILON_END", 0.01)?,
            epsilon_decay: env_parse("EPSILON_DECAY", 0.995)?,
            target_sync_steps: env_parse("TARGET_SYNC_STEPS", 100)?,
            checkpoint_steps: env_parse("CHECKPOINT_STEPS", 500)?,
            buffer_capacity: env_parse("BUFFER_CAPACITY", 10_000)?,
            learning_rate: env_parse("LEARNING_RATE", 0.001)?,

            load_capacity_cap: env_parse("LOAD_CAPACITY_CAP", 50.0)?,
            port: env_parse("PORT", 8080)?,
        })
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_s)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_s)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Parse an optional env var, falling back to `default` when unset, with a
/// helpful error if the value is present but malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be valid: {e}"))
            .context(format!("failed to parse {key}")),
        Err(_) => Ok(default),
    }
}
