//! Tabular value learning
//!
//! A Q-table over coarsely quantized positions, updated with one-step
//! Bellman backups. Rare high-magnitude rewards (deaths, checkpoints) use a
//! boosted learning rate and are spread to neighboring cells on the same row
//! to compensate for table sparsity.

pub mod agent;
pub mod q_table;

pub use agent::{TabularAgent, TabularState};
pub use q_table::{StateKey, ValueTable, bellman_update};
