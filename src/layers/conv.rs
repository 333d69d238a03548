//! 2D convolution over stacked frames
//!
//! The Q-network only uses valid (unpadded) convolutions, so the layer keeps
//! no padding state. Each sample is lowered to a column matrix (`im2col`)
//! and multiplied with the flattened kernels; samples of a batch are
//! processed in parallel.

use ndarray::{s, stack, Array1, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis};
use ndarray::parallel::prelude::*;
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;

/// 2D Convolutional Layer
///
/// Input and output tensors are laid out as `[batch, channels, height, width]`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conv2DLayer {
    /// Convolution kernels/filters [out_channels, in_channels, kernel_size, kernel_size]
    pub kernels: Array4<f32>,

    /// Bias terms for each output channel
    pub biases: Array1<f32>,

    /// Activation function
    pub activation: Activation,

    /// Stride for convolution (same along both axes)
    pub stride: usize,

    /// Number of input channels
    pub in_channels: usize,

    /// Number of output channels (filters)
    pub out_channels: usize,

    /// Kernel size (square kernels)
    pub kernel_size: usize,
}

/// Gradients produced by [`Conv2DLayer::backward_batch`]
pub struct Conv2DGradients {
    pub input: Array4<f32>,
    pub kernels: Array4<f32>,
    pub biases: Array1<f32>,
}

impl Conv2DLayer {
    /// Create a new 2D convolutional layer
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if kernel_size == 0 || stride == 0 || in_channels == 0 || out_channels == 0 {
            return Err(DqnError::invalid_parameter(
                "conv2d",
                "channels, kernel size and stride must be non-zero",
            ));
        }

        let fan_in = in_channels * kernel_size * kernel_size;
        let kernels = init.initialize((out_channels, in_channels, kernel_size, kernel_size), fan_in, rng);
        let biases = init.initialize(out_channels, fan_in, rng);

        Ok(Conv2DLayer {
            kernels,
            biases,
            activation,
            stride,
            in_channels,
            out_channels,
            kernel_size,
        })
    }

    /// Spatial output size for a given input size, or an error when the
    /// kernel does not fit.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        if height < self.kernel_size || width < self.kernel_size {
            return Err(DqnError::dimension_mismatch(
                format!("input of at least {0}x{0}", self.kernel_size),
                format!("{}x{}", height, width),
            ));
        }
        Ok((
            (height - self.kernel_size) / self.stride + 1,
            (width - self.kernel_size) / self.stride + 1,
        ))
    }

    fn check_input(&self, input: &ArrayView4<f32>) -> Result<(usize, usize)> {
        let (_, channels, height, width) = input.dim();
        if channels != self.in_channels {
            return Err(DqnError::dimension_mismatch(
                format!("{} input channels", self.in_channels),
                format!("{} input channels", channels),
            ));
        }
        self.output_size(height, width)
    }

    /// Kernels viewed as a `[out_channels, in_channels * k * k]` matrix.
    fn kernel_matrix(&self) -> Result<ArrayView2<f32>> {
        let cols = self.in_channels * self.kernel_size * self.kernel_size;
        self.kernels
            .view()
            .into_shape((self.out_channels, cols))
            .map_err(|e| DqnError::NumericalError(format!("kernel layout: {}", e)))
    }

    /// Lower one `[channels, height, width]` sample to a column matrix of
    /// shape `[in_channels * k * k, out_h * out_w]`.
    fn im2col(&self, input: ArrayView3<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
        let k = self.kernel_size;
        let step = self.stride as isize;
        let mut cols = Array2::zeros((self.in_channels * k * k, out_h * out_w));

        for c in 0..self.in_channels {
            for kh in 0..k {
                for kw in 0..k {
                    let row = (c * k + kh) * k + kw;
                    let patch = input.slice(s![
                        c,
                        kh..kh + self.stride * (out_h - 1) + 1;step,
                        kw..kw + self.stride * (out_w - 1) + 1;step
                    ]);
                    cols.row_mut(row)
                        .iter_mut()
                        .zip(patch.iter())
                        .for_each(|(dst, &src)| *dst = src);
                }
            }
        }

        cols
    }

    /// Scatter-add a column matrix back onto a `[channels, height, width]` gradient.
    fn col2im(&self, cols: ArrayView2<f32>, height: usize, width: usize, out_h: usize, out_w: usize) -> Array3<f32> {
        let k = self.kernel_size;
        let step = self.stride as isize;
        let mut grad = Array3::zeros((self.in_channels, height, width));

        for c in 0..self.in_channels {
            for kh in 0..k {
                for kw in 0..k {
                    let row = (c * k + kh) * k + kw;
                    let mut patch = grad.slice_mut(s![
                        c,
                        kh..kh + self.stride * (out_h - 1) + 1;step,
                        kw..kw + self.stride * (out_w - 1) + 1;step
                    ]);
                    patch
                        .iter_mut()
                        .zip(cols.row(row).iter())
                        .for_each(|(dst, &src)| *dst += src);
                }
            }
        }

        grad
    }

    /// Convolution without activation for a single sample.
    fn convolve_sample(
        &self,
        kernel_matrix: &ArrayView2<f32>,
        sample: ArrayView3<f32>,
        out_h: usize,
        out_w: usize,
    ) -> Result<Array3<f32>> {
        let cols = self.im2col(sample, out_h, out_w);
        let mut out = kernel_matrix.dot(&cols);
        out += &self.biases.view().insert_axis(Axis(1));
        out.into_shape((self.out_channels, out_h, out_w))
            .map_err(|e| DqnError::NumericalError(format!("convolution output: {}", e)))
    }

    fn pre_activation(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (out_h, out_w) = self.check_input(&input)?;
        let kernel_matrix = self.kernel_matrix()?;
        let samples: Vec<usize> = (0..input.shape()[0]).collect();

        let outputs: Vec<Array3<f32>> = samples
            .par_iter()
            .map(|&b| self.convolve_sample(&kernel_matrix, input.index_axis(Axis(0), b), out_h, out_w))
            .collect::<Result<_>>()?;

        if outputs.is_empty() {
            return Ok(Array4::zeros((0, self.out_channels, out_h, out_w)));
        }
        let views: Vec<ArrayView3<f32>> = outputs.iter().map(|o| o.view()).collect();
        stack(Axis(0), &views).map_err(|e| DqnError::NumericalError(e.to_string()))
    }

    /// Forward pass for a batch of images `[batch, channels, height, width]`.
    pub fn forward_batch(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut output = self.pre_activation(input)?;
        self.activation.apply(&mut output);
        Ok(output)
    }

    /// Forward pass that also returns the pre-activation values needed by
    /// [`Conv2DLayer::backward_batch`].
    pub fn forward_batch_cached(&self, input: ArrayView4<f32>) -> Result<(Array4<f32>, Array4<f32>)> {
        let pre_activation = self.pre_activation(input)?;
        let mut output = pre_activation.clone();
        self.activation.apply(&mut output);
        Ok((output, pre_activation))
    }

    /// Backward pass given the layer input, its pre-activation output and
    /// the gradient of the loss with respect to the layer output.
    pub fn backward_batch(
        &self,
        input: ArrayView4<f32>,
        pre_activation: ArrayView4<f32>,
        output_gradient: ArrayView4<f32>,
    ) -> Result<Conv2DGradients> {
        let (out_h, out_w) = self.check_input(&input)?;
        if pre_activation.dim() != output_gradient.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", pre_activation.dim()),
                format!("{:?}", output_gradient.dim()),
            ));
        }
        let (batch_size, _, height, width) = input.dim();

        let grad = &output_gradient * &self.activation.derivative(pre_activation);
        let kernel_matrix = self.kernel_matrix()?;
        let samples: Vec<usize> = (0..batch_size).collect();

        let per_sample: Vec<(Array3<f32>, Array2<f32>)> = samples
            .par_iter()
            .map(|&b| {
                let cols = self.im2col(input.index_axis(Axis(0), b), out_h, out_w);
                let grad_out = grad
                    .index_axis(Axis(0), b)
                    .to_owned()
                    .into_shape((self.out_channels, out_h * out_w))
                    .map_err(|e| DqnError::NumericalError(format!("output gradient: {}", e)))?;
                let kernel_grad = grad_out.dot(&cols.t());
                let col_grad = kernel_matrix.t().dot(&grad_out);
                Ok((self.col2im(col_grad.view(), height, width, out_h, out_w), kernel_grad))
            })
            .collect::<Result<_>>()?;

        let mut input_grad = Array4::zeros((batch_size, self.in_channels, height, width));
        let mut kernel_grad = Array2::zeros(kernel_matrix.dim());
        for (b, (sample_input_grad, sample_kernel_grad)) in per_sample.into_iter().enumerate() {
            input_grad.index_axis_mut(Axis(0), b).assign(&sample_input_grad);
            kernel_grad += &sample_kernel_grad;
        }

        let kernels = kernel_grad
            .into_shape(self.kernels.dim())
            .map_err(|e| DqnError::NumericalError(e.to_string()))?;
        let biases = grad.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));

        Ok(Conv2DGradients {
            input: input_grad,
            kernels,
            biases,
        })
    }
}
