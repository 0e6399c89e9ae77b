//! Learning control loop for a side-scrolling platformer
//!
//! This crate provides:
//! - An episode controller driving a game simulation through menus, play and
//!   terminal states, with shaped rewards
//! - Spatial death-zone memory and a rule-based action scorer
//! - A tabular Q-learning agent and a replay-based value-network agent
//! - Persistence of learned state, a training pipeline with observers, and a CLI

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dqn;
pub mod episode;
pub mod error;
pub mod game;
pub mod heuristic;
pub mod memory;
pub mod persistence;
pub mod pipeline;
pub mod ports;
pub mod q_learning;
pub mod reward;

pub use error::{Error, Result};
