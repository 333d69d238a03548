//! # Activation Functions Module
//!
//! The Q-network only needs two non-linearities: ReLU after every hidden
//! convolution and fully-connected stage, and the identity on the output
//! projection so that action values stay unbounded.
//!
//! ```rust
//! use atari_dqn::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![1.0, -0.5, 0.0, 2.0];
//! Activation::Relu.apply(&mut data);
//! assert_eq!(data, array![1.0, 0.0, 0.0, 2.0]);
//! ```

pub mod functions;

pub use functions::Activation;
