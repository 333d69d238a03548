//! Environment interface consumed by the trainer
//!
//! Observations arrive already preprocessed: a stack of `K` grayscale
//! frames of shape `[K, height, width]`. Frame skipping, resizing and
//! stacking are the environment's job.

use std::sync::Arc;
use ndarray::Array3;

use crate::error::Result;

mod catch;
pub use catch::{PixelCatch, PixelCatchConfig};

/// A stacked-frame observation. Shared between the transition that produced
/// it and the one that starts from it.
pub type Observation = Arc<Array3<u8>>;

/// Auxiliary information returned with every step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepInfo {
    /// Lives remaining after the step
    pub lives: u32,
}

/// Outcome of [`Environment::step`]
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    /// Raw, unclipped reward
    pub reward: f32,
    /// The emulator episode is over
    pub terminal: bool,
    pub info: StepInfo,
}

pub trait Environment {
    /// Number of discrete actions accepted by [`Environment::step`]
    fn num_actions(&self) -> usize;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Observation>;

    /// Advance one step. Fails on an invalid action or when the episode has
    /// not been reset.
    fn step(&mut self, action: usize) -> Result<StepResult>;
}

/// Clip a raw reward to its sign.
pub fn clip_reward(reward: f32) -> f32 {
    if reward > 0.0 {
        1.0
    } else if reward < 0.0 {
        -1.0
    } else {
        0.0
    }
}
