//! Background trainer: drives `PolicyService::train` on a fixed cadence.
//! No coordination with the selection path beyond the shared `ArcSwap`
//! snapshot; a failed or skipped tick simply retries at the next one.

use std::sync::Arc;
use std::time::Duration;

use super::service::PolicyService;

const DEFAULT_TICK_INTERVAL_S: u64 = 60;
const DEFAULT_ITERATIONS_PER_TICK: u32 = 10;

pub struct TrainerConfig {
    pub tick_interval: Duration,
    pub iterations_per_tick: u32,
    pub batch_size: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_S),
            iterations_per_tick: DEFAULT_ITERATIONS_PER_TICK,
            batch_size: 64,
        }
    }
}

/// Runs until the process exits. Spawned as a background task by the
/// ingress binary at startup; see `bin/trainer.rs` for the standalone
/// offline-warm-start variant.
pub async fn run(policy: Arc<PolicyService>, cfg: TrainerConfig) {
    let mut interval = tokio::time::interval(cfg.tick_interval);
    loop {
        interval.tick().await;
        let stats = policy.train(cfg.batch_size, cfg.iterations_per_tick);
        if stats.iterations_run == 0 {
            tracing::debug!("training tick skipped: replay buffer below batch size");
            continue;
        }
        tracing::info!(
            loss = stats.mean_loss,
            epsilon = stats.epsilon,
            steps = stats.steps,
            "policy training tick complete"
        );
    }
}
