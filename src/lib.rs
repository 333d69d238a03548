//! # atari-dqn - Deep Q-Learning with a target network for Atari-style games
//!
//! The crate trains an agent on stacked grayscale frames with the classic
//! DQN recipe: a convolutional action-value network, an experience replay
//! buffer, epsilon-greedy exploration, Huber loss with Adam, and a target
//! network that is synced from the online network every `C` steps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atari_dqn::config::TrainingConfig;
//! use atari_dqn::env::{Environment, PixelCatch, PixelCatchConfig};
//! use atari_dqn::network::{NetworkConfig, QNetwork};
//! use atari_dqn::reporter::FileReporter;
//! use atari_dqn::trainer::Trainer;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let config = TrainingConfig::default();
//! let env = PixelCatch::new(PixelCatchConfig::default()).unwrap();
//! let mut rng = StdRng::seed_from_u64(config.seed);
//! let network = NetworkConfig::atari(env.num_actions());
//! let online = QNetwork::new(network, &mut rng).unwrap();
//! let target = QNetwork::new(network, &mut rng).unwrap();
//! let reporter = FileReporter::new(&config.checkpoint_dir, &config.plot_path);
//!
//! let mut trainer = Trainer::new(config, env, online, target, reporter).unwrap();
//! trainer.run().unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and identity activations
//! - [`agent`] - The `QFunction` estimator trait and the DQN agent
//! - [`config`] - Training hyperparameters
//! - [`env`] - Environment interface and a pixel catch game
//! - [`error`] - Error types and result handling
//! - [`layers`] - Convolution and dense layers
//! - [`loss`] - Huber loss
//! - [`metrics`] - Reward tracking and statistics
//! - [`network`] - The convolutional Q-network
//! - [`optimizer`] - Adam
//! - [`replay_buffer`] - Experience replay
//! - [`reporter`] - Checkpoints and reward curves
//! - [`schedule`] - Epsilon decay
//! - [`trainer`] - The training loop
//! - [`visualization`] - SVG and ASCII reward plots

pub mod activations;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod reporter;
pub mod schedule;
pub mod trainer;
pub mod visualization;

#[cfg(test)]
mod tests;
