//! CLI infrastructure for the scroller toolkit
//!
//! This module provides the command-line interface for training agents
//! against the course simulation and inspecting their persisted state.

pub mod commands;
pub mod config;
pub mod output;
