//! `PolicyParams`: everything the DQN needs to act or resume training,
//! published as a single immutable snapshot behind `ArcSwap` so `select()`
//! never observes a partially-updated network mid-training-step.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::network::Network;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamMoment {
    pub m_w: Array2<f32>,
    pub v_w: Array2<f32>,
    pub m_b: Array1<f32>,
    pub v_b: Array1<f32>,
}

impl AdamMoment {
    fn zeros_like(layer: &super::network::Layer) -> Self {
        Self {
            m_w: Array2::zeros(layer.w.dim()),
            v_w: Array2::zeros(layer.w.dim()),
            m_b: Array1::zeros(layer.b.len()),
            v_b: Array1::zeros(layer.b.len()),
        }
    }
}

/// Optimizer moment state for every layer of the `policy` network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamState {
    pub moments: Vec<AdamMoment>,
}

impl AdamState {
    pub fn for_network(network: &Network) -> Self {
        Self { moments: network.layers.iter().map(AdamMoment::zeros_like).collect() }
    }

    /// One Adam step in place over `network`'s layers, given per-layer
    /// gradients and the current step count (1-indexed, for bias correction).
    pub fn step(
        &mut self,
        network: &mut Network,
        grads: &super::network::Gradients,
        learning_rate: f32,
        step: u64,
    ) {
        let t = step as f32;
        let bias_correction1 = 1.0 - ADAM_BETA1.powf(t);
        let bias_correction2 = 1.0 - ADAM_BETA2.powf(t);

        for (i, layer) in network.layers.iter_mut().enumerate() {
            let moment = &mut self.moments[i];

            moment.m_w = &moment.m_w * ADAM_BETA1 + &grads.dw[i] * (1.0 - ADAM_BETA1);
            moment.v_w = &moment.v_w * ADAM_BETA2 + &grads.dw[i].mapv(|g| g * g) * (1.0 - ADAM_BETA2);
            let m_hat_w = &moment.m_w / bias_correction1;
            let v_hat_w = &moment.v_w / bias_correction2;
            layer.w = &layer.w - &(m_hat_w / (v_hat_w.mapv(f32::sqrt) + ADAM_EPS) * learning_rate);

            moment.m_b = &moment.m_b * ADAM_BETA1 + &grads.db[i] * (1.0 - ADAM_BETA1);
            moment.v_b = &moment.v_b * ADAM_BETA2 + &grads.db[i].mapv(|g| g * g) * (1.0 - ADAM_BETA2);
            let m_hat_b = &moment.m_b / bias_correction1;
            let v_hat_b = &moment.v_b / bias_correction2;
            layer.b = &layer.b - &(m_hat_b / (v_hat_b.mapv(f32::sqrt) + ADAM_EPS) * learning_rate);
        }
    }
}

/// The full snapshot swapped atomically by `PolicyService`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyParams {
    pub policy: Network,
    pub target: Network,
    pub adam: AdamState,
    pub epsilon: f32,
    pub steps: u64,
}

impl PolicyParams {
    pub fn new(state_dim: usize, action_count: usize, seed: u64, epsilon_start: f32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let policy = Network::new(state_dim, action_count, &mut rng);
        let target = policy.clone_params();
        let adam = AdamState::for_network(&policy);
        Self { policy, target, adam, epsilon: epsilon_start, steps: 0 }
    }
}
