use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;
use rand::Rng;
use serde::{Serialize, Deserialize};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WeightInit {
    /// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]` for weights and biases.
    ///
    /// This matches the default initialization of convolutional and linear
    /// layers in the common deep learning frameworks, which the Atari DQN
    /// hyperparameters were tuned against.
    #[default]
    FanInUniform,

    /// Every weight and bias set to the same value
    Constant(f32),

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Initialize a weight tensor of the given shape.
    pub fn initialize<Sh, D, R>(&self, shape: Sh, fan_in: usize, rng: &mut R) -> Array<f32, D>
    where
        Sh: ShapeBuilder<Dim = D>,
        D: Dimension,
        R: Rng + ?Sized,
    {
        match self {
            WeightInit::FanInUniform => {
                let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
                Array::random_using(shape, Uniform::new_inclusive(-bound, bound), rng)
            }
            WeightInit::Constant(value) => Array::from_elem(shape, *value),
            WeightInit::Zeros => Array::zeros(shape),
        }
    }
}
