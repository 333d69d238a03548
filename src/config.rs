use std::fs;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};

use crate::error::{DqnError, Result};
use crate::schedule::EpsilonSchedule;

/// Hyperparameters and output locations of a training run.
///
/// Missing fields in a JSON file fall back to the Atari defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Replay buffer capacity
    pub buffer_size: usize,
    /// Global step budget; training stops once the step count exceeds it
    pub nb_epochs: usize,
    /// Learn every `train_frequency` steps
    pub train_frequency: usize,
    pub batch_size: usize,
    /// Discount factor
    pub gamma: f32,
    /// No learning until the step count exceeds this
    pub replay_start_size: usize,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub exploration_steps: usize,
    /// Copy online parameters into the target every this many steps
    pub target_sync_interval: usize,
    pub learning_rate: f32,
    /// Steps between reward-curve reports
    pub report_interval: usize,
    /// Upper bound of the random number of fire steps after a reset
    pub max_noop_steps: usize,
    /// Action issued during the warm-up steps
    pub fire_action: usize,
    pub seed: u64,
    pub checkpoint_dir: PathBuf,
    pub plot_path: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            buffer_size: 1_000_000,
            nb_epochs: 30_000_000,
            train_frequency: 4,
            batch_size: 32,
            gamma: 0.99,
            replay_start_size: 50_000,
            epsilon_start: 1.0,
            epsilon_end: 0.1,
            exploration_steps: 1_000_000,
            target_sync_interval: 10_000,
            learning_rate: 1.25e-4,
            report_interval: 50_000,
            max_noop_steps: 30,
            fire_action: 1,
            seed: 0,
            checkpoint_dir: PathBuf::from("."),
            plot_path: PathBuf::from("Imgs/average_reward_on_breakout.svg"),
        }
    }
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(DqnError::invalid_parameter(name, "must be greater than 0"));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DqnError::invalid_parameter(
            name.to_string(),
            format!("must be in [0, 1], got {}", value),
        ));
    }
    Ok(())
}

impl TrainingConfig {
    /// Check every field; the first invalid one is reported.
    pub fn validate(&self) -> Result<()> {
        positive("buffer_size", self.buffer_size)?;
        positive("nb_epochs", self.nb_epochs)?;
        positive("train_frequency", self.train_frequency)?;
        positive("batch_size", self.batch_size)?;
        positive("exploration_steps", self.exploration_steps)?;
        positive("target_sync_interval", self.target_sync_interval)?;
        positive("report_interval", self.report_interval)?;
        positive("max_noop_steps", self.max_noop_steps)?;
        unit_interval("gamma", self.gamma)?;
        unit_interval("epsilon_start", self.epsilon_start)?;
        unit_interval("epsilon_end", self.epsilon_end)?;
        if !(self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        Ok(())
    }

    pub fn epsilon_schedule(&self) -> EpsilonSchedule {
        EpsilonSchedule::new(self.epsilon_start, self.epsilon_end, self.exploration_steps)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }
}
