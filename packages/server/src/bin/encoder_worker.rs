//! Standalone encoder worker process: `Q_enc` -> embed -> `Q_ret`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rag_llm_backend::{BaseEmbeddingBackend, HttpEmbeddingBackend};
use rag_server::config::Config;
use rag_server::kernel::RedisQueueBroker;
use rag_server::pipeline::encoder;
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
    let embedder: Arc<dyn BaseEmbeddingBackend> = Arc::new(
        HttpEmbeddingBackend::new(config.embed_url.clone(), config.embed_dim, config.llm_timeout())
            .context("failed to construct embedding backend client")?,
    );

    let (_tx, rx) = tokio::sync::watch::channel(false);
    tracing::info!("encoder worker starting");
    encoder::run(
        queue,
        embedder,
        Duration::from_secs(config.encoder_recv_timeout_s),
        rx,
    )
    .await;

    Ok(())
}
