use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;

/// A fully connected (dense) layer in a neural network
///
/// Weights are stored as `[input_size, output_size]` so that a batch of row
/// vectors is transformed with a single `inputs.dot(&weights)`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

/// Gradients produced by [`DenseLayer::backward_batch`]
pub struct DenseGradients {
    pub input: Array2<f32>,
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Create a new dense layer with the given input size, output size, and activation function.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        let weights = init.initialize((input_size, output_size), input_size, rng);
        let biases = init.initialize(output_size, input_size, rng);
        DenseLayer {
            weights,
            biases,
            activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[1]
    }

    fn pre_activation(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.shape()[1] != self.input_size() {
            return Err(DqnError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{} input features", inputs.shape()[1]),
            ));
        }
        Ok(inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0)))
    }

    /// Perform a forward pass for a batch of input vectors.
    pub fn forward_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut outputs = self.pre_activation(inputs)?;
        self.activation.apply(&mut outputs);
        Ok(outputs)
    }

    /// Forward pass returning `(output, pre_activation)`.
    pub fn forward_batch_cached(&self, inputs: ArrayView2<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
        let pre_activation = self.pre_activation(inputs)?;
        let mut outputs = pre_activation.clone();
        self.activation.apply(&mut outputs);
        Ok((outputs, pre_activation))
    }

    /// Compute gradients for a batch given the layer inputs, the cached
    /// pre-activation values and the loss gradient at the layer output.
    pub fn backward_batch(
        &self,
        inputs: ArrayView2<f32>,
        pre_activation: ArrayView2<f32>,
        output_errors: ArrayView2<f32>,
    ) -> Result<DenseGradients> {
        if output_errors.dim() != pre_activation.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", pre_activation.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative(pre_activation);
        let adjusted_error = &output_errors * &activation_deriv;
        let weight_gradients = inputs.t().dot(&adjusted_error);
        let bias_gradients = adjusted_error.sum_axis(Axis(0));
        let input_gradients = adjusted_error.dot(&self.weights.t());

        Ok(DenseGradients {
            input: input_gradients,
            weights: weight_gradients,
            biases: bias_gradients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_dense_forward_known_weights() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = DenseLayer::new(2, 2, Activation::Relu, WeightInit::Zeros, &mut rng);
        layer.weights = array![[1.0, -1.0], [2.0, -2.0]];
        layer.biases = array![0.5, 0.5];

        let output = layer.forward_batch(array![[1.0, 1.0]].view()).unwrap();
        assert_eq!(output, array![[3.5, 0.0]]);
    }

    #[test]
    fn test_dense_backward_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = DenseLayer::new(3, 4, Activation::Linear, WeightInit::FanInUniform, &mut rng);
        let inputs = array![[1.0, 2.0, 3.0], [0.5, -1.0, 0.0]];
        let (outputs, pre_activation) = layer.forward_batch_cached(inputs.view()).unwrap();
        let grads = layer
            .backward_batch(inputs.view(), pre_activation.view(), Array2::ones(outputs.dim()).view())
            .unwrap();

        assert_eq!(grads.weights.dim(), (3, 4));
        assert_eq!(grads.biases.len(), 4);
        assert_eq!(grads.input.dim(), (2, 3));
        assert_eq!(grads.biases, array![2.0, 2.0, 2.0, 2.0]);
    }
}
