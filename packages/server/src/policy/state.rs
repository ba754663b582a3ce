//! The fixed 10-dimension state vector consumed by the DQN.

pub const STATE_DIM: usize = 10;
const MAX_TRACKED_REPLICAS: usize = 3;

/// Raw system observations the orchestrator gathers before asking the policy
/// for an action. Kept separate from the normalized vector so tests can
/// construct one without knowing the normalization constants.
#[derive(Debug, Clone)]
pub struct SystemObservation {
    pub replica_loads: Vec<i64>,
    pub queue_depth: usize,
    pub recent_avg_latency_s: f64,
    pub recent_rps: f64,
    pub success_rate: f64,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub hour_of_day: u32,
}

/// Normalization constants from SPEC_FULL.md §4.6.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub load_capacity_cap: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self { load_capacity_cap: 10.0 }
    }
}

/// Build the 10-vector: three replica loads (zero-padded), queue depth,
/// average latency, RPS, success rate, memory, CPU, hour-of-day.
pub fn build_state(obs: &SystemObservation, norm: Normalization) -> [f32; STATE_DIM] {
    let mut state = [0.0f32; STATE_DIM];

    for i in 0..MAX_TRACKED_REPLICAS {
        let load = obs.replica_loads.get(i).copied().unwrap_or(0) as f64;
        state[i] = (load / norm.load_capacity_cap) as f32;
    }

    state[3] = (obs.queue_depth as f64 / 100.0) as f32;
    state[4] = obs.recent_avg_latency_s as f32;
    state[5] = (obs.recent_rps / 10.0) as f32;
    state[6] = obs.success_rate as f32;
    state[7] = obs.memory_usage as f32;
    state[8] = obs.cpu_usage as f32;
    state[9] = (obs.hour_of_day as f64 / 24.0) as f32;

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> SystemObservation {
        SystemObservation {
            replica_loads: vec![2, 4],
            queue_depth: 10,
            recent_avg_latency_s: 0.5,
            recent_rps: 5.0,
            success_rate: 0.9,
            memory_usage: 0.3,
            cpu_usage: 0.2,
            hour_of_day: 12,
        }
    }

    #[test]
    fn loads_are_padded_with_zeros_past_replica_count() {
        let state = build_state(&sample_observation(), Normalization::default());
        assert_eq!(state[2], 0.0);
    }

    #[test]
    fn normalizations_match_the_documented_divisors() {
        let state = build_state(&sample_observation(), Normalization::default());
        assert!((state[3] - 0.1).abs() < 1e-6);
        assert!((state[5] - 0.5).abs() < 1e-6);
        assert!((state[9] - 0.5).abs() < 1e-6);
    }
}
