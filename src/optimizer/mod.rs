//! Gradient-based parameter updates
//!
//! Optimizers keep their per-parameter state keyed by parameter name, so a
//! network only has to hand over `(name, parameter, gradient)` triples.

use std::collections::BTreeMap;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use serde::{Serialize, Deserialize};
use crate::error::{DqnError, Result};

pub trait Optimizer: Send {
    /// Start a new optimization step. Called once before the parameter
    /// updates belonging to the same loss gradient.
    fn begin_step(&mut self);

    /// Update one named parameter tensor in place.
    fn update(
        &mut self,
        name: &str,
        parameter: ArrayViewMutD<f32>,
        gradient: ArrayViewD<f32>,
        learning_rate: f32,
    ) -> Result<()>;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Moments {
    m: ArrayD<f32>,
    v: ArrayD<f32>,
}

/// Adam optimizer with bias-corrected first and second moment estimates
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Number of optimization steps started so far
    pub t: u64,
    moments: BTreeMap<String, Moments>,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            t: 0,
            moments: BTreeMap::new(),
        }
    }

    /// Number of parameter tensors with optimizer state
    pub fn tracked_parameters(&self) -> usize {
        self.moments.len()
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(
        &mut self,
        name: &str,
        parameter: ArrayViewMutD<f32>,
        gradient: ArrayViewD<f32>,
        learning_rate: f32,
    ) -> Result<()> {
        if parameter.shape() != gradient.shape() {
            return Err(DqnError::dimension_mismatch(
                format!("gradient for '{}' with shape {:?}", name, parameter.shape()),
                format!("{:?}", gradient.shape()),
            ));
        }

        let moments = self.moments.entry(name.to_string()).or_insert_with(|| Moments {
            m: ArrayD::zeros(parameter.raw_dim()),
            v: ArrayD::zeros(parameter.raw_dim()),
        });
        if moments.m.shape() != parameter.shape() {
            return Err(DqnError::dimension_mismatch(
                format!("optimizer state for '{}' with shape {:?}", name, moments.m.shape()),
                format!("{:?}", parameter.shape()),
            ));
        }

        let (beta1, beta2) = (self.beta1, self.beta2);
        moments.m.zip_mut_with(&gradient, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        moments.v.zip_mut_with(&gradient, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let t = self.t.max(1).min(i32::MAX as u64) as i32;
        let bias_correction1 = 1.0 - beta1.powi(t);
        let bias_correction2 = 1.0 - beta2.powi(t);
        let epsilon = self.epsilon;

        Zip::from(parameter)
            .and(&moments.m)
            .and(&moments.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias_correction1;
                let v_hat = v / bias_correction2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });

        Ok(())
    }
}
