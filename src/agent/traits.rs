use std::path::Path;
use ndarray::{Array2, ArrayView1, ArrayView4};

use crate::error::Result;
use crate::loss::Loss;
use crate::network::{ParameterSet, QNetwork};
use crate::optimizer::Optimizer;

/// An action-value estimator that can be trained and snapshotted.
///
/// The agent holds two independent instances (online and target). Nothing
/// here shares state between instances; copying parameters is always an
/// explicit [`QFunction::load_parameters`].
pub trait QFunction: Send {
    /// Number of discrete actions scored per observation
    fn num_actions(&self) -> usize;

    /// Score every action for a batch of `[batch, frames, height, width]`
    /// observations with raw pixel values.
    fn evaluate(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Mean loss of the values of the taken actions against `targets`, and
    /// the gradient of that loss for every parameter.
    fn loss_and_gradients(
        &self,
        observations: ArrayView4<f32>,
        actions: &[usize],
        targets: ArrayView1<f32>,
        loss: &dyn Loss,
    ) -> Result<(f32, ParameterSet)>;

    /// One optimizer step on this estimator's parameters.
    fn apply_gradients(
        &mut self,
        gradients: &ParameterSet,
        optimizer: &mut dyn Optimizer,
        learning_rate: f32,
    ) -> Result<()>;

    fn parameters(&self) -> ParameterSet;

    fn load_parameters(&mut self, params: &ParameterSet) -> Result<()>;

    /// Persist the estimator to `path`.
    fn save(&self, path: &Path) -> Result<()>;
}

impl QFunction for QNetwork {
    fn num_actions(&self) -> usize {
        QNetwork::num_actions(self)
    }

    fn evaluate(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        QNetwork::evaluate(self, observations)
    }

    fn loss_and_gradients(
        &self,
        observations: ArrayView4<f32>,
        actions: &[usize],
        targets: ArrayView1<f32>,
        loss: &dyn Loss,
    ) -> Result<(f32, ParameterSet)> {
        QNetwork::loss_and_gradients(self, observations, actions, targets, loss)
    }

    fn apply_gradients(
        &mut self,
        gradients: &ParameterSet,
        optimizer: &mut dyn Optimizer,
        learning_rate: f32,
    ) -> Result<()> {
        QNetwork::apply_gradients(self, gradients, optimizer, learning_rate)
    }

    fn parameters(&self) -> ParameterSet {
        QNetwork::parameters(self)
    }

    fn load_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        QNetwork::load_parameters(self, params)
    }

    fn save(&self, path: &Path) -> Result<()> {
        QNetwork::save(self, path)
    }
}
