//! Standalone offline trainer: loads a checkpoint, runs a bounded number of
//! iterations against synthetic experience, and saves. Useful for warm
//! starts before the ingress has accumulated any real traffic.

use anyhow::{Context, Result};
use clap::Parser;
use rag_server::config::Config;
use rag_server::policy::{PolicyConfig, PolicyService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Training iterations to run against the seeded synthetic buffer.
    #[arg(long, default_value_t = 100)]
    iterations: u32,

    /// Number of synthetic experiences to seed before training.
    #[arg(long, default_value_t = 1000)]
    seed_experiences: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;

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
    let policy = PolicyService::load_or_init(policy_config, 0).await;

    tracing::info!(seed_experiences = args.seed_experiences, "seeding synthetic experience");
    seed_synthetic_experience(&policy, &config, args.seed_experiences);

    let stats = policy.train(config.batch_size, args.iterations);
    tracing::info!(
        loss = stats.mean_loss,
        iterations_run = stats.iterations_run,
        epsilon = stats.epsilon,
        "offline training complete"
    );

    policy.save().await.context("failed to persist checkpoint")?;
    tracing::info!(path = %config.checkpoint_path, "checkpoint saved");

    Ok(())
}

/// Uniformly random states/actions with rewards drawn from the same reward
/// function real traffic would produce, so the warm-started network at
/// least sees a plausible distribution before going live.
fn seed_synthetic_experience(policy: &PolicyService, config: &Config, count: usize) {
    use rag_server::policy::STATE_DIM;
    use rand::Rng;

    let mut rng = rand::thread_rng();
    for _ in 0..count {
        let state: [f32; STATE_DIM] = std::array::from_fn(|_| rng.gen_range(0.0..1.0));
        let action = rng.gen_range(0..config.replica_count);
        let success = rng.gen_bool(0.9);
        let latency_ms: u64 = rng.gen_range(20..800);
        let loads: Vec<i64> = (0..config.replica_count).map(|_| rng.gen_range(0..10)).collect();

        policy.record(state, action, latency_ms, success, &loads);
    }
}
