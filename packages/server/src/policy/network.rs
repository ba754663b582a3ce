//! A small hand-rolled feed-forward network: input -> 128 -> 128 -> 128 -> N,
//! ReLU hidden activations, trained by manual backprop with an Adam update.
//! There is no teacher file that does anything like this; the shape of the
//! code (explicit layers, cached activations, a `Gradients` struct) is
//! grounded in `knhk-neural`'s `ndarray`-based network module.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

const HIDDEN: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
}

impl Layer {
    fn glorot(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let w = Array2::random_using((input_dim, output_dim), Uniform::new(-limit, limit), rng);
        let b = Array1::zeros(output_dim);
        Self { w, b }
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        input.dot(&self.w) + &self.b
    }
}

fn relu(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| v.max(0.0))
}

fn relu_grad(pre_activation: &Array1<f32>) -> Array1<f32> {
    pre_activation.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

/// A full forward pass: four linear layers, ReLU after the first three.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
}

/// Activations retained from a forward pass, needed to run backprop.
pub struct ForwardCache {
    pub inputs: Vec<Array1<f32>>,
    pub pre_activations: Vec<Array1<f32>>,
}

/// Per-layer gradients produced by `backward`.
pub struct Gradients {
    pub dw: Vec<Array2<f32>>,
    pub db: Vec<Array1<f32>>,
}

impl Network {
    pub fn new(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        let layers = vec![
            Layer::glorot(input_dim, HIDDEN, rng),
            Layer::glorot(HIDDEN, HIDDEN, rng),
            Layer::glorot(HIDDEN, HIDDEN, rng),
            Layer::glorot(HIDDEN, output_dim, rng),
        ];
        Self { layers }
    }

    pub fn seeded(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(input_dim, output_dim, &mut rng)
    }

    pub fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let (output, _) = self.forward_with_cache(input);
        output
    }

    pub fn forward_with_cache(&self, input: &Array1<f32>) -> (Array1<f32>, ForwardCache) {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();

        for (i, layer) in self.layers.iter().enumerate() {
            inputs.push(current.clone());
            let pre = layer.forward(&current);
            pre_activations.push(pre.clone());
            current = if i + 1 < self.layers.len() { relu(&pre) } else { pre };
        }

        (current, ForwardCache { inputs, pre_activations })
    }

    /// Backprop the output gradient through every layer. `d_output` has the
    /// same shape as the network's output (Q-values); zero it everywhere
    /// except the taken action before calling this for a DQN loss.
    pub fn backward(&self, cache: &ForwardCache, d_output: Array1<f32>) -> Gradients {
        let n_layers = self.layers.len();
        let mut dw = vec![Array2::zeros((0, 0)); n_layers];
        let mut db = vec![Array1::zeros(0); n_layers];
        let mut d_current = d_output;

        for i in (0..n_layers).rev() {
            let input = &cache.inputs[i];
            dw[i] = {
                let input_col = input.view().insert_axis(Axis(1));
                let grad_row = d_current.view().insert_axis(Axis(0));
                input_col.dot(&grad_row)
            };
            db[i] = d_current.clone();

            if i > 0 {
                let d_input = self.layers[i].w.dot(&d_current);
                let relu_mask = relu_grad(&cache.pre_activations[i - 1]);
                d_current = d_input * relu_mask;
            }
        }

        Gradients { dw, db }
    }

    pub fn clone_params(&self) -> Network {
        self.clone()
    }
}

/// Clips the global gradient norm across every layer's weights and biases to
/// at most `max_norm`, scaling all tensors uniformly when it is exceeded.
pub fn clip_grad_norm(grads: &mut Gradients, max_norm: f32) {
    let mut total_sq = 0.0f32;
    for w in &grads.dw {
        total_sq += w.mapv(|v| v * v).sum();
    }
    for b in &grads.db {
        total_sq += b.mapv(|v| v * v).sum();
    }
    let norm = total_sq.sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for w in grads.dw.iter_mut() {
            w.mapv_inplace(|v| v * scale);
        }
        for b in grads.db.iter_mut() {
            b.mapv_inplace(|v| v * scale);
        }
    }
}
