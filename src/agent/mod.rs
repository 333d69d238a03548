//! # Agent
//!
//! The DQN agent owns the online and target estimators, the optimizer and
//! the loss. It knows how to pick an action and how to take one learning
//! step from a sampled batch; when to do either is decided by the
//! [`Trainer`](crate::trainer::Trainer).
//!
//! - `QFunction`: the estimator seam. [`QNetwork`](crate::network::QNetwork)
//!   is the production implementation; tests may plug in anything cheaper.
//! - `DqnAgent`: epsilon-greedy acting, bootstrap targets from the target
//!   estimator, Huber loss and Adam updates on the online estimator.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use atari_dqn::agent::{DqnAgent, DqnAgentBuilder};
//! use atari_dqn::network::{NetworkConfig, QNetwork};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let online = QNetwork::new(NetworkConfig::atari(4), &mut rng).unwrap();
//! let target = QNetwork::new(NetworkConfig::atari(4), &mut rng).unwrap();
//! let agent: DqnAgent<QNetwork> = DqnAgentBuilder::new()
//!     .gamma(0.99)
//!     .learning_rate(1.25e-4)
//!     .build(online, target)
//!     .unwrap();
//! ```

pub mod traits;

mod dqn;
pub use dqn::{compute_targets, DqnAgent, DqnAgentBuilder};
pub use traits::QFunction;
