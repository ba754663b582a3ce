//! The HTTP ingress: `POST /query`, `GET /metrics`, `GET /health`. Spawns
//! the background trainer task alongside the HTTP listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use rag_server::config::Config;
use rag_server::kernel::{LoadAccount, RedisCompletionStore, RedisLoadAccount, RedisQueueBroker};
use rag_server::orchestrator::Orchestrator;
use rag_server::policy::{trainer, PolicyConfig, PolicyService};
use rag_server::server::{build_router, AppState};
use rag_server::server::metrics::Metrics;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rag_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting RAG ingress");

    let config = Arc::new(Config::from_env().context("failed to load configuration")?);

    let queue = Arc::new(
        RedisQueueBroker::new(&config.redis_url).context("failed to construct Redis queue broker")?,
    );
    let completions = Arc::new(
        RedisCompletionStore::new(&config.redis_url)
            .context("failed to construct Redis completion store")?,
    );
    let load: Arc<dyn LoadAccount> = Arc::new(
        RedisLoadAccount::new(&config.redis_url).context("failed to construct Redis load account")?,
    );

    let policy_config = PolicyConfig {
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
    };
    let policy = Arc::new(PolicyService::load_or_init(policy_config, 0).await);

    tokio::spawn(trainer::run(policy.clone(), trainer::TrainerConfig {
        batch_size: config.batch_size,
        ..Default::default()
    }));

    let orchestrator = Orchestrator::new(queue, completions, load.clone(), policy, config.clone());

    let state = Arc::new(AppState {
        orchestrator,
        metrics: Metrics::new(),
        load,
        config: config.clone(),
    });

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
