//! Standalone retriever worker process: `Q_ret` -> top-K search -> `Q_llm`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rag_llm_backend::{BaseVectorIndex, HttpVectorIndex};
use rag_server::config::Config;
use rag_server::kernel::RedisQueueBroker;
use rag_server::pipeline::retriever;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let queue = Arc::new(
        RedisQueueBroker::new(&config.redis_url).context("failed to construct Redis queue broker")?,
    );
    let index: Arc<dyn BaseVectorIndex> = Arc::new(
        HttpVectorIndex::new(config.vector_index_url.clone(), config.llm_timeout())
            .context("failed to construct vector index client")?,
    );

    let (_tx, rx) = tokio::sync::watch::channel(false);
    tracing::info!("retriever worker starting");
    retriever::run(
        queue,
        index,
        config.vector_collection.clone(),
        config.top_k,
        Duration::from_secs(config.encoder_recv_timeout_s),
        rx,
    )
    .await;

    Ok(())
}
