//! Standalone generator worker process: `Q_llm` -> LLM -> `completion:<job_id>`.
//! Identified at startup by `--replica-id`/`WORKER_NAME`; any generator
//! consuming the shared `Q_llm` may process any job (§9).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rag_llm_backend::{BaseLlmBackend, GenerationOptions, HttpLlmBackend};
use rag_server::config::Config;
use rag_server::kernel::{RedisCompletionStore, RedisQueueBroker};
use rag_server::pipeline::generator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Identifies this replica in completion records and load accounting.
    #[arg(long, env = "WORKER_NAME", default_value = "gen-0")]
    replica_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let queue = Arc::new(
        RedisQueueBroker::new(&config.redis_url).context("failed to construct Redis queue broker")?,
    );
    let completions = Arc::new(
        RedisCompletionStore::new(&config.redis_url)
            .context("failed to construct Redis completion store")?,
    );
    let llm: Arc<dyn BaseLlmBackend> = Arc::new(
        HttpLlmBackend::new(config.llm_url.clone(), config.llm_timeout())
            .context("failed to construct LLM backend client")?,
    );

    let (_tx, rx) = tokio::sync::watch::channel(false);
    tracing::info!(replica_id = %args.replica_id, "generator worker starting");
    generator::run(
        queue,
        completions,
        llm,
        args.replica_id,
        Duration::from_secs(config.encoder_recv_timeout_s),
        Duration::from_secs(config.job_timeout_s),
        GenerationOptions::default(),
        rx,
    )
    .await;

    Ok(())
}
