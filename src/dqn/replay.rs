//! Bounded experience replay

use std::collections::VecDeque;

use rand::{Rng, seq::index};

use crate::{Error, Result, game::FeatureVector};

/// Encoded transition as stored for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub features: FeatureVector,
    /// Index into [`crate::game::Action::GAMEPLAY`].
    pub action: usize,
    pub reward: f64,
    pub next_features: FeatureVector,
    pub done: bool,
}

/// FIFO replay buffer: once full, every push evicts the oldest experience.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("replay buffer capacity must be positive"));
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Add an experience, returning the evicted one when the buffer was full.
    pub fn push(&mut self, experience: Experience) -> Option<Experience> {
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(experience);
        evicted
    }

    /// Uniform sample without replacement. Returns fewer than `batch_size`
    /// experiences only when the buffer holds fewer.
    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Vec<&Experience> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
