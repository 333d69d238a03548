use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView4, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};
use bincode::{serialize, deserialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::{Conv2DLayer, DenseLayer, WeightInit};
use crate::loss::Loss;
use crate::optimizer::Optimizer;

/// Named parameter tensors, e.g. `"conv1.weight"` or `"head.bias"`.
pub type ParameterSet = BTreeMap<String, ArrayD<f32>>;

/// Pixel intensities are divided by this before the first convolution.
pub const PIXEL_SCALE: f32 = 255.0;

/// Hidden width of the fully-connected stage.
pub const HIDDEN_UNITS: usize = 512;

/// Shape of the observations fed to the network and the size of its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of stacked frames
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    pub num_actions: usize,
}

impl NetworkConfig {
    /// Four stacked 84x84 frames, the standard Atari preprocessing.
    pub fn atari(num_actions: usize) -> Self {
        NetworkConfig {
            in_channels: 4,
            height: 84,
            width: 84,
            num_actions,
        }
    }

    /// Number of features after the last convolution (3136 for Atari input).
    pub fn flatten_size(&self) -> Result<usize> {
        let (c, h, w) = self.conv_output_shape()?;
        Ok(c * h * w)
    }

    /// `[channels, height, width]` after the three convolution stages.
    pub fn conv_output_shape(&self) -> Result<(usize, usize, usize)> {
        let (mut h, mut w) = (self.height, self.width);
        for &(_, kernel, stride) in CONV_STAGES.iter() {
            if h < kernel || w < kernel {
                return Err(DqnError::invalid_parameter(
                    "observation shape".to_string(),
                    format!("{}x{} frames are too small for the convolution stack", self.height, self.width),
                ));
            }
            h = (h - kernel) / stride + 1;
            w = (w - kernel) / stride + 1;
        }
        Ok((CONV_STAGES[2].0, h, w))
    }
}

/// (out_channels, kernel_size, stride) of the three convolution stages.
const CONV_STAGES: [(usize, usize, usize); 3] = [(32, 8, 4), (64, 4, 2), (64, 3, 1)];

/// Activations recorded during a forward pass, consumed by [`QNetwork::backward`].
pub struct ForwardCache {
    input: Array4<f32>,
    conv1: (Array4<f32>, Array4<f32>),
    conv2: (Array4<f32>, Array4<f32>),
    conv3: (Array4<f32>, Array4<f32>),
    flat: Array2<f32>,
    fc: (Array2<f32>, Array2<f32>),
    head_pre: Array2<f32>,
}

/// The action-value estimator: three ReLU convolutions, a 512-unit ReLU
/// layer and a linear projection to one value per action.
///
/// The network holds parameters only. Evaluation takes `&self` and has no
/// side effects; training goes through [`QNetwork::forward_cached`] and
/// [`QNetwork::backward`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QNetwork {
    pub config: NetworkConfig,
    pub conv1: Conv2DLayer,
    pub conv2: Conv2DLayer,
    pub conv3: Conv2DLayer,
    pub fc: DenseLayer,
    pub head: DenseLayer,
}

impl QNetwork {
    /// Create a network with the default fan-in uniform initialization.
    pub fn new<R: Rng + ?Sized>(config: NetworkConfig, rng: &mut R) -> Result<Self> {
        Self::with_init(config, WeightInit::FanInUniform, rng)
    }

    pub fn with_init<R: Rng + ?Sized>(config: NetworkConfig, init: WeightInit, rng: &mut R) -> Result<Self> {
        if config.num_actions == 0 {
            return Err(DqnError::invalid_parameter("num_actions", "must be greater than 0"));
        }
        let flatten_size = config.flatten_size()?;

        let [(c1, k1, s1), (c2, k2, s2), (c3, k3, s3)] = CONV_STAGES;
        let conv1 = Conv2DLayer::new(config.in_channels, c1, k1, s1, Activation::Relu, init, rng)?;
        let conv2 = Conv2DLayer::new(c1, c2, k2, s2, Activation::Relu, init, rng)?;
        let conv3 = Conv2DLayer::new(c2, c3, k3, s3, Activation::Relu, init, rng)?;
        let fc = DenseLayer::new(flatten_size, HIDDEN_UNITS, Activation::Relu, init, rng);
        let head = DenseLayer::new(HIDDEN_UNITS, config.num_actions, Activation::Linear, init, rng);

        Ok(QNetwork { config, conv1, conv2, conv3, fc, head })
    }

    pub fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    fn check_observations(&self, observations: &ArrayView4<f32>) -> Result<()> {
        let (_, c, h, w) = observations.dim();
        let expected = (self.config.in_channels, self.config.height, self.config.width);
        if (c, h, w) != expected {
            return Err(DqnError::dimension_mismatch(
                format!("observations of shape {:?}", expected),
                format!("{:?}", (c, h, w)),
            ));
        }
        Ok(())
    }

    fn flatten(features: Array4<f32>) -> Result<Array2<f32>> {
        let batch = features.shape()[0];
        let size = features.len() / batch.max(1);
        let features = if features.is_standard_layout() {
            features
        } else {
            features.as_standard_layout().into_owned()
        };
        features
            .into_shape((batch, size))
            .map_err(|e| DqnError::NumericalError(format!("flatten: {}", e)))
    }

    /// Compute one value per action for a batch of raw pixel observations
    /// `[batch, frames, height, width]` with intensities in `0..=255`.
    pub fn evaluate(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.check_observations(&observations)?;
        let x = observations.mapv(|v| v / PIXEL_SCALE);
        let x = self.conv1.forward_batch(x.view())?;
        let x = self.conv2.forward_batch(x.view())?;
        let x = self.conv3.forward_batch(x.view())?;
        let x = Self::flatten(x)?;
        let x = self.fc.forward_batch(x.view())?;
        self.head.forward_batch(x.view())
    }

    /// Forward pass that keeps every intermediate activation for backprop.
    pub fn forward_cached(&self, observations: ArrayView4<f32>) -> Result<(Array2<f32>, ForwardCache)> {
        self.check_observations(&observations)?;
        let input = observations.mapv(|v| v / PIXEL_SCALE);
        let conv1 = self.conv1.forward_batch_cached(input.view())?;
        let conv2 = self.conv2.forward_batch_cached(conv1.0.view())?;
        let conv3 = self.conv3.forward_batch_cached(conv2.0.view())?;
        let flat = Self::flatten(conv3.0.clone())?;
        let fc = self.fc.forward_batch_cached(flat.view())?;
        let (q_values, head_pre) = self.head.forward_batch_cached(fc.0.view())?;

        Ok((q_values, ForwardCache { input, conv1, conv2, conv3, flat, fc, head_pre }))
    }

    /// Back-propagate the loss gradient with respect to the Q-values
    /// (`[batch, num_actions]`) and return one gradient per parameter.
    pub fn backward(&self, cache: &ForwardCache, q_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        let head = self.head.backward_batch(cache.fc.0.view(), cache.head_pre.view(), q_gradient)?;
        let fc = self.fc.backward_batch(cache.flat.view(), cache.fc.1.view(), head.input.view())?;

        let conv3_shape = cache.conv3.0.raw_dim();
        let conv3_grad = fc
            .input
            .into_shape(conv3_shape)
            .map_err(|e| DqnError::NumericalError(format!("unflatten: {}", e)))?;
        let conv3 = self.conv3.backward_batch(cache.conv2.0.view(), cache.conv3.1.view(), conv3_grad.view())?;
        let conv2 = self.conv2.backward_batch(cache.conv1.0.view(), cache.conv2.1.view(), conv3.input.view())?;
        let conv1 = self.conv1.backward_batch(cache.input.view(), cache.conv1.1.view(), conv2.input.view())?;

        let mut gradients = ParameterSet::new();
        gradients.insert("conv1.weight".to_string(), conv1.kernels.into_dyn());
        gradients.insert("conv1.bias".to_string(), conv1.biases.into_dyn());
        gradients.insert("conv2.weight".to_string(), conv2.kernels.into_dyn());
        gradients.insert("conv2.bias".to_string(), conv2.biases.into_dyn());
        gradients.insert("conv3.weight".to_string(), conv3.kernels.into_dyn());
        gradients.insert("conv3.bias".to_string(), conv3.biases.into_dyn());
        gradients.insert("fc.weight".to_string(), fc.weights.into_dyn());
        gradients.insert("fc.bias".to_string(), fc.biases.into_dyn());
        gradients.insert("head.weight".to_string(), head.weights.into_dyn());
        gradients.insert("head.bias".to_string(), head.biases.into_dyn());
        Ok(gradients)
    }

    /// Mean loss between `targets` and the values of the taken `actions`,
    /// together with the parameter gradients of that loss.
    pub fn loss_and_gradients(
        &self,
        observations: ArrayView4<f32>,
        actions: &[usize],
        targets: ArrayView1<f32>,
        loss: &dyn Loss,
    ) -> Result<(f32, ParameterSet)> {
        let batch_size = observations.shape()[0];
        if actions.len() != batch_size || targets.len() != batch_size {
            return Err(DqnError::dimension_mismatch(
                format!("{} actions and targets", batch_size),
                format!("{} actions, {} targets", actions.len(), targets.len()),
            ));
        }
        if let Some(&action) = actions.iter().find(|&&a| a >= self.num_actions()) {
            return Err(DqnError::InvalidAction { action, max_actions: self.num_actions() });
        }

        let (q_values, cache) = self.forward_cached(observations)?;
        let predicted: Array1<f32> = actions
            .iter()
            .enumerate()
            .map(|(i, &a)| q_values[[i, a]])
            .collect();

        let value = loss.compute(predicted.view(), targets);
        if !value.is_finite() {
            return Err(DqnError::NumericalError(format!("non-finite loss {}", value)));
        }

        // Only the gathered entries receive gradient.
        let predicted_grad = loss.gradient(predicted.view(), targets);
        let mut q_gradient = Array2::zeros(q_values.dim());
        for (i, &a) in actions.iter().enumerate() {
            q_gradient[[i, a]] = predicted_grad[i];
        }

        let gradients = self.backward(&cache, q_gradient.view())?;
        Ok((value, gradients))
    }

    /// Copy of every parameter tensor, keyed by name.
    pub fn parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert("conv1.weight".to_string(), self.conv1.kernels.clone().into_dyn());
        params.insert("conv1.bias".to_string(), self.conv1.biases.clone().into_dyn());
        params.insert("conv2.weight".to_string(), self.conv2.kernels.clone().into_dyn());
        params.insert("conv2.bias".to_string(), self.conv2.biases.clone().into_dyn());
        params.insert("conv3.weight".to_string(), self.conv3.kernels.clone().into_dyn());
        params.insert("conv3.bias".to_string(), self.conv3.biases.clone().into_dyn());
        params.insert("fc.weight".to_string(), self.fc.weights.clone().into_dyn());
        params.insert("fc.bias".to_string(), self.fc.biases.clone().into_dyn());
        params.insert("head.weight".to_string(), self.head.weights.clone().into_dyn());
        params.insert("head.bias".to_string(), self.head.biases.clone().into_dyn());
        params
    }

    /// Mutable views of every parameter tensor, keyed by name.
    fn parameters_mut(&mut self) -> Vec<(&'static str, ArrayViewMutD<f32>)> {
        vec![
            ("conv1.weight", self.conv1.kernels.view_mut().into_dyn()),
            ("conv1.bias", self.conv1.biases.view_mut().into_dyn()),
            ("conv2.weight", self.conv2.kernels.view_mut().into_dyn()),
            ("conv2.bias", self.conv2.biases.view_mut().into_dyn()),
            ("conv3.weight", self.conv3.kernels.view_mut().into_dyn()),
            ("conv3.bias", self.conv3.biases.view_mut().into_dyn()),
            ("fc.weight", self.fc.weights.view_mut().into_dyn()),
            ("fc.bias", self.fc.biases.view_mut().into_dyn()),
            ("head.weight", self.head.weights.view_mut().into_dyn()),
            ("head.bias", self.head.biases.view_mut().into_dyn()),
        ]
    }

    /// Overwrite every parameter with the tensors in `params`.
    ///
    /// Fails without modifying anything if a tensor is missing or has the
    /// wrong shape.
    pub fn load_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        for (name, view) in self.parameters_mut() {
            let source = params.get(name).ok_or_else(|| {
                DqnError::invalid_parameter("parameters".to_string(), format!("missing tensor '{}'", name))
            })?;
            if source.shape() != view.shape() {
                return Err(DqnError::dimension_mismatch(
                    format!("'{}' with shape {:?}", name, view.shape()),
                    format!("{:?}", source.shape()),
                ));
            }
        }
        for (name, mut view) in self.parameters_mut() {
            if let Some(source) = params.get(name) {
                view.assign(source);
            }
        }
        Ok(())
    }

    /// Apply one optimizer step with the given gradients.
    pub fn apply_gradients(
        &mut self,
        gradients: &ParameterSet,
        optimizer: &mut dyn Optimizer,
        learning_rate: f32,
    ) -> Result<()> {
        optimizer.begin_step();
        for (name, view) in self.parameters_mut() {
            let gradient = gradients.get(name).ok_or_else(|| {
                DqnError::TrainingError(format!("no gradient for parameter '{}'", name))
            })?;
            optimizer.update(name, view, gradient.view(), learning_rate)?;
        }
        Ok(())
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.parameters().values().map(|p| p.len()).sum()
    }

    /// Save the network (architecture and parameters) to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serialize(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a network previously written by [`QNetwork::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        let network: Self = deserialize(&data)?;
        Ok(network)
    }
}

/// Index of the largest value in each row; the first index wins ties.
pub fn argmax_rows(values: ArrayView2<f32>) -> Vec<usize> {
    values
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Largest value in each row.
pub fn max_rows(values: ArrayView2<f32>) -> Array1<f32> {
    values.map_axis(Axis(1), |row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
}
