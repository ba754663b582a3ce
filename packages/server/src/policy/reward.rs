//! Reward shaping, isolated so invariant #6 ("reward is -10 iff success is
//! false") is trivially testable without standing up a whole policy service.

const FAILURE_REWARD: f32 = -10.0;

pub fn variance(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
    let sum_sq = values.iter().map(|v| {
        let d = *v as f64 - mean;
        d * d
    }).sum::<f64>();
    sum_sq / values.len() as f64
}

/// `reward = -10` on failure, else `(1 - min(latency_ms/1000, 1)) - 0.1 * variance(loads)`.
pub fn compute_reward(success: bool, latency_ms: u64, replica_loads: &[i64]) -> f32 {
    if !success {
        return FAILURE_REWARD;
    }
    let latency_term = 1.0 - (latency_ms as f64 / 1000.0).min(1.0);
    let load_penalty = 0.1 * variance(replica_loads);
    (latency_term - load_penalty) as f32
}
