//! The RL control plane: state encoding, the DQN itself, experience replay,
//! reward shaping, and the service/trainer that wrap them behind a narrow
//! public interface (§9's "Global mutable state" resolution).

mod network;
mod params;
pub mod reward;
pub mod service;
pub mod state;
pub mod trainer;

mod replay;

pub use replay::Experience;
pub use service::{PolicyConfig, PolicyService, PolicyStats, TrainStats};
pub use state::{build_state, Normalization, SystemObservation, STATE_DIM};
