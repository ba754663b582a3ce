//! `PolicyService`: the only thing outside this module allowed to touch a
//! weight matrix. Exposes exactly `select`/`record`/`train`/`stats`/`save`/
//! `reset_epsilon`, per SPEC_FULL.md §9's "Global mutable state" resolution.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arc_swap::ArcSwap;
use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::common::AppError;

use super::network::{clip_grad_norm, Gradients, Network};
use super::params::{AdamState, PolicyParams};
use super::replay::{Experience, ReplayBuffer};
use super::reward::compute_reward;
use super::state::{build_state, Normalization, SystemObservation, STATE_DIM};

const EXPERIENCE_CHANNEL_CAPACITY: usize = 1024;
const GRAD_CLIP_NORM: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub action_count: usize,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay: f32,
    pub target_sync_steps: u64,
    pub checkpoint_steps: u64,
    pub buffer_capacity: usize,
    pub learning_rate: f32,
    pub checkpoint_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PolicyStats {
    pub epsilon: f32,
    pub steps: u64,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrainStats {
    pub iterations_run: u32,
    pub mean_loss: f32,
    pub steps: u64,
    pub epsilon: f32,
}

/// On-disk representation: parameters plus the replay buffer is *not*
/// persisted (experience is cheap to regather; weights are not).
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    params: PolicyParams,
}

pub struct PolicyService {
    params: ArcSwap<PolicyParams>,
    buffer: Mutex<ReplayBuffer>,
    exp_tx: mpsc::Sender<Experience>,
    exp_rx: Mutex<mpsc::Receiver<Experience>>,
    cfg: PolicyConfig,
}

impl PolicyService {
    pub fn new(cfg: PolicyConfig, seed: u64) -> Self {
        let params = PolicyParams::new(STATE_DIM, cfg.action_count, seed, cfg.epsilon_start);
        let (exp_tx, exp_rx) = mpsc::channel(EXPERIENCE_CHANNEL_CAPACITY);
        Self {
            params: ArcSwap::from_pointee(params),
            buffer: Mutex::new(ReplayBuffer::new(cfg.buffer_capacity)),
            exp_tx,
            exp_rx: Mutex::new(exp_rx),
            cfg,
        }
    }

    /// Load a previously-saved checkpoint, falling back to freshly
    /// initialized parameters if the file does not exist.
    pub async fn load_or_init(cfg: PolicyConfig, seed: u64) -> Self {
        let service = Self::new(cfg.clone(), seed);
        if let Ok(bytes) = tokio::fs::read(&cfg.checkpoint_path).await {
            if let Ok(checkpoint) = serde_json::from_slice::<Checkpoint>(&bytes) {
                service.params.store(std::sync::Arc::new(checkpoint.params));
                tracing::info!(path = %cfg.checkpoint_path.display(), "loaded policy checkpoint");
            }
        }
        service
    }

    /// ε-greedy action selection against the current parameter snapshot.
    /// `select` clones the Arc once and reads it through to completion, so a
    /// concurrent `train` swap never tears the decision.
    pub fn select(&self, state: &[f32; STATE_DIM], rng: &mut impl Rng) -> Result<usize, AppError> {
        if self.cfg.action_count == 0 {
            return Err(AppError::PolicyUnavailable("no replicas configured".to_string()));
        }
        let snapshot = self.params.load();

        if rng.gen::<f32>() < snapshot.epsilon {
            return Ok(rng.gen_range(0..self.cfg.action_count));
        }

        let input = Array1::from_vec(state.to_vec());
        let q_values = snapshot.policy.forward(&input);
        let action = argmax(&q_values);
        Ok(action)
    }

    /// Compute the reward for a completed job and push the resulting
    /// experience onto the bounded channel. Never blocks; a full channel
    /// drops the experience (logged at `debug`) rather than stalling the
    /// ingress response path.
    ///
    /// The next-state vector is re-derived here from the post-dispatch load
    /// vector rather than accepted from the caller, mirroring the reference
    /// agent's `next_state = get_current_state()` re-observation; the system
    /// metrics `select()` has no fresher view of (queue depth, recent
    /// latency/RPS/success-rate, resource usage) are approximated with the
    /// same stand-in values `SystemObservation` uses elsewhere pending a
    /// real monitoring feed.
    pub fn record(
        &self,
        state: [f32; STATE_DIM],
        action: usize,
        latency_ms: u64,
        success: bool,
        replica_loads: &[i64],
    ) -> f32 {
        let reward = compute_reward(success, latency_ms, replica_loads);

        let next_observation = SystemObservation {
            replica_loads: replica_loads.to_vec(),
            queue_depth: 0,
            recent_avg_latency_s: 0.0,
            recent_rps: 0.0,
            success_rate: 1.0,
            memory_usage: 0.0,
            cpu_usage: 0.0,
            hour_of_day: 0,
        };
        let next_state = build_state(&next_observation, Normalization::default());

        let experience = Experience { state, action, reward, next_state, done: false };
        if let Err(e) = self.exp_tx.try_send(experience) {
            tracing::debug!(error = %e, "dropped experience, channel full or closed");
        }
        reward
    }

    fn drain_pending(&self) {
        let mut rx = self.exp_rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        while let Ok(experience) = rx.try_recv() {
            buffer.push(experience);
        }
    }

    /// Run up to `iterations` DQN training steps, each over a freshly
    /// sampled minibatch of `batch_size`. A step with too few buffered
    /// transitions is skipped, not treated as an error.
    pub fn train(&self, batch_size: usize, iterations: u32) -> TrainStats {
        self.drain_pending();

        let mut rng = rand::thread_rng();
        let mut params = (**self.params.load()).clone();
        let mut total_loss = 0.0f32;
        let mut steps_run = 0u32;

        for _ in 0..iterations {
            let batch = {
                let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
                buffer.sample(batch_size, &mut rng)
            };
            let Some(batch) = batch else { break };

            let loss = self.train_step(&mut params, &batch);
            total_loss += loss;
            steps_run += 1;

            params.steps += 1;
            params.epsilon = (params.epsilon * self.cfg.epsilon_decay).max(self.cfg.epsilon_end);

            if params.steps % self.cfg.target_sync_steps == 0 {
                params.target = params.policy.clone_params();
            }

            if params.steps % self.cfg.checkpoint_steps == 0 {
                let snapshot = params.clone();
                let path = self.cfg.checkpoint_path.clone();
                tokio::spawn(async move {
                    if let Err(e) = write_checkpoint(&path, &snapshot).await {
                        tracing::warn!(error = %e, "failed to persist policy checkpoint");
                    }
                });
            }
        }

        let stats = TrainStats {
            iterations_run: steps_run,
            mean_loss: if steps_run > 0 { total_loss / steps_run as f32 } else { 0.0 },
            steps: params.steps,
            epsilon: params.epsilon,
        };

        self.params.store(std::sync::Arc::new(params));
        stats
    }

    fn train_step(&self, params: &mut PolicyParams, batch: &[Experience]) -> f32 {
        let n_layers = params.policy.layers.len();
        let mut acc_dw: Vec<ndarray::Array2<f32>> =
            params.policy.layers.iter().map(|l| ndarray::Array2::zeros(l.w.dim())).collect();
        let mut acc_db: Vec<Array1<f32>> =
            params.policy.layers.iter().map(|l| Array1::zeros(l.b.len())).collect();
        let mut total_loss = 0.0f32;

        for experience in batch {
            let state = Array1::from_vec(experience.state.to_vec());
            let next_state = Array1::from_vec(experience.next_state.to_vec());

            let (q_values, cache) = params.policy.forward_with_cache(&state);
            let next_q = params.target.forward(&next_state);
            let max_next_q = next_q.iter().cloned().fold(f32::MIN, f32::max);

            let done = if experience.done { 0.0 } else { 1.0 };
            let td_target = experience.reward + self.cfg.gamma * max_next_q * done;
            let current_q = q_values[experience.action];
            let td_error = current_q - td_target;
            total_loss += td_error * td_error;

            let mut d_output = Array1::zeros(q_values.len());
            d_output[experience.action] = 2.0 * td_error / batch.len() as f32;

            let grads = params.policy.backward(&cache, d_output);
            for i in 0..n_layers {
                acc_dw[i] = &acc_dw[i] + &grads.dw[i];
                acc_db[i] = &acc_db[i] + &grads.db[i];
            }
        }

        for i in 0..n_layers {
            acc_dw[i].mapv_inplace(|v| v / batch.len() as f32);
            acc_db[i].mapv_inplace(|v| v / batch.len() as f32);
        }

        let mut grads = Gradients { dw: acc_dw, db: acc_db };
        clip_grad_norm(&mut grads, GRAD_CLIP_NORM);

        params.adam.step(&mut params.policy, &grads, self.cfg.learning_rate, params.steps + 1);

        total_loss / batch.len() as f32
    }

    pub fn stats(&self) -> PolicyStats {
        let snapshot = self.params.load();
        let buffer_size = self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len();
        PolicyStats { epsilon: snapshot.epsilon, steps: snapshot.steps, buffer_size }
    }

    pub fn reset_epsilon(&self, epsilon: f32) {
        let mut params = (**self.params.load()).clone();
        params.epsilon = epsilon.clamp(self.cfg.epsilon_end, self.cfg.epsilon_start);
        self.params.store(std::sync::Arc::new(params));
    }

    pub async fn save(&self) -> Result<(), AppError> {
        let snapshot = (**self.params.load()).clone();
        write_checkpoint(&self.cfg.checkpoint_path, &snapshot).await
    }
}

async fn write_checkpoint(path: &Path, params: &PolicyParams) -> Result<(), AppError> {
    let checkpoint = Checkpoint { params: params.clone() };
    let payload = serde_json::to_vec_pretty(&checkpoint)
        .map_err(|e| AppError::BackendFailure(format!("checkpoint serialization failed: {e}")))?;

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::BackendFailure(format!("checkpoint dir creation failed: {e}")))?;
    }

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, payload)
        .await
        .map_err(|e| AppError::BackendFailure(format!("checkpoint write failed: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AppError::BackendFailure(format!("checkpoint rename failed: {e}")))?;
    Ok(())
}

fn argmax(values: &Array1<f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best_idx, best_val), (idx, &val)| {
            if val > best_val { (idx, val) } else { (best_idx, best_val) }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_config() -> PolicyConfig {
        PolicyConfig {
            action_count: 3,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            target_sync_steps: 100,
            checkpoint_steps: 500,
            buffer_capacity: 100,
            learning_rate: 1e-3,
            checkpoint_path: std::env::temp_dir().join("policy_checkpoint_test.json"),
        }
    }

    #[test]
    fn select_with_epsilon_one_always_explores_within_bounds() {
        let service = PolicyService::new(test_config(), 42);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let state = [0.0; STATE_DIM];
        for _ in 0..20 {
            let action = service.select(&state, &mut rng).unwrap();
            assert!(action < 3);
        }
    }

    #[test]
    fn reset_epsilon_clamps_to_the_configured_bounds() {
        let service = PolicyService::new(test_config(), 42);
        service.reset_epsilon(5.0);
        assert_eq!(service.stats().epsilon, 1.0);
        service.reset_epsilon(-1.0);
        assert_eq!(service.stats().epsilon, 0.01);
    }

    #[test]
    fn record_computes_and_returns_the_reward() {
        let service = PolicyService::new(test_config(), 42);
        let reward = service.record([0.0; STATE_DIM], 0, 10, false, &[1, 2]);
        assert_eq!(reward, -10.0);
    }

    #[test]
    fn train_is_a_no_op_when_the_buffer_is_smaller_than_the_batch() {
        let service = PolicyService::new(test_config(), 42);
        service.record([0.0; STATE_DIM], 0, 10, true, &[1]);
        let stats = service.train(64, 5);
        assert_eq!(stats.iterations_run, 0);
        assert_eq!(stats.steps, 0);
    }

    #[test]
    fn train_runs_requested_iterations_once_buffer_is_full_enough() {
        let mut cfg = test_config();
        cfg.buffer_capacity = 10;
        let service = PolicyService::new(cfg, 42);
        for i in 0..10 {
            service.record([0.1 * i as f32; STATE_DIM], i % 3, 50, true, &[1, 2, 3]);
        }
        let stats = service.train(4, 3);
        assert_eq!(stats.iterations_run, 3);
        assert_eq!(stats.steps, 3);
        assert!(stats.epsilon < 1.0);
    }
}
