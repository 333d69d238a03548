use ndarray::{Array1, ArrayView1};

/// Trait defining the interface for loss functions
///
/// Both methods reduce over the batch by averaging, so `gradient` already
/// carries the `1 / batch_size` factor.
pub trait Loss: Send + Sync {
    /// Compute the mean loss over a batch of scalar predictions and targets
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32;

    /// Compute the gradient of the mean loss with respect to the predictions
    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32>;
}

/// Huber loss (smooth L1)
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }
}

impl Default for HuberLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Loss for HuberLoss {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        if predictions.is_empty() {
            return 0.0;
        }
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            let abs_x = x.abs();
            if abs_x <= self.delta {
                0.5 * x * x
            } else {
                self.delta * (abs_x - 0.5 * self.delta)
            }
        }).sum() / predictions.len() as f32
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        let batch_size = predictions.len().max(1) as f32;
        let diff = &predictions - &targets;
        diff.mapv(|x| x.clamp(-self.delta, self.delta)) / batch_size
    }
}
