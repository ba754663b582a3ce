//! Bounded-capacity experience replay ring buffer.

use std::collections::VecDeque;

use super::state::STATE_DIM;

/// `(state, action, reward, next_state, done)`. `done` is always `false` in
/// this domain — there is no episodic boundary, matching the source agent.
#[derive(Debug, Clone)]
pub struct Experience {
    pub state: [f32; STATE_DIM],
    pub action: usize,
    pub reward: f32,
    pub next_state: [f32; STATE_DIM],
    pub done: bool,
}

pub struct ReplayBuffer {
    capacity: usize,
    entries: VecDeque<Experience>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, experience: Experience) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(experience);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniformly sample `batch_size` experiences with replacement. Returns
    /// `None` if fewer transitions are buffered than requested — the caller
    /// treats that as a skipped (not failed) training step.
    pub fn sample(&self, batch_size: usize, rng: &mut impl rand::Rng) -> Option<Vec<Experience>> {
        if self.entries.len() < batch_size {
            return None;
        }
        let batch = (0..batch_size)
            .map(|_| {
                let idx = rng.gen_range(0..self.entries.len());
                self.entries[idx].clone()
            })
            .collect();
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_experience(reward: f32) -> Experience {
        Experience {
            state: [0.0; STATE_DIM],
            action: 0,
            reward,
            next_state: [0.0; STATE_DIM],
            done: false,
        }
    }

    #[test]
    fn oldest_entries_are_evicted_past_capacity() {
        let mut buffer = ReplayBuffer::new(2);
        buffer.push(sample_experience(1.0));
        buffer.push(sample_experience(2.0));
        buffer.push(sample_experience(3.0));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.entries[0].reward, 2.0);
    }

    #[test]
    fn sample_returns_none_when_buffer_is_smaller_than_the_batch() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(sample_experience(1.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(buffer.sample(5, &mut rng).is_none());
    }

    #[test]
    fn sample_returns_batch_of_requested_size() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..5 {
            buffer.push(sample_experience(i as f32));
        }
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let batch = buffer.sample(3, &mut rng).unwrap();
        assert_eq!(batch.len(), 3);
    }
}
