//! Function-approximation agent with experience replay
//!
//! A small multilayer perceptron maps the encoder's fixed-width feature
//! vector to one value per gameplay action. Training samples come from a
//! bounded FIFO replay buffer, and bootstrapped targets come from a
//! periodically synced copy of the online network.

pub mod agent;
pub mod network;
pub mod replay;

pub use agent::{NetworkAgent, NetworkState};
pub use network::{NetworkWeights, QNetwork, TrainingSample};
pub use replay::{Experience, ReplayBuffer};
