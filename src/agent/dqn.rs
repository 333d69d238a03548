use ndarray::{Array1, ArrayView1, ArrayView3, Axis, Zip};
use rand::Rng;

use crate::agent::traits::QFunction;
use crate::error::{DqnError, Result};
use crate::loss::HuberLoss;
use crate::network::{argmax_rows, max_rows};
use crate::optimizer::Adam;
use crate::replay_buffer::Batch;

/// Deep Q-Network agent with a target network
///
/// `online` is trained by [`DqnAgent::learn`]; `target` only changes when
/// [`DqnAgent::sync_target`] copies the online parameters into it. The two
/// estimators never share storage.
///
/// # Example
///
/// ```rust
/// use atari_dqn::agent::DqnAgent;
/// use atari_dqn::network::{NetworkConfig, QNetwork};
/// use ndarray::Array3;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let config = NetworkConfig { in_channels: 4, height: 36, width: 36, num_actions: 3 };
/// let online = QNetwork::new(config, &mut rng).unwrap();
/// let target = QNetwork::new(config, &mut rng).unwrap();
/// let agent = DqnAgent::new(online, target, 0.99, 1.25e-4).unwrap();
///
/// let observation = Array3::<u8>::zeros((4, 36, 36));
/// let action = agent.act(observation.view(), 0.0, &mut rng).unwrap();
/// assert!(action < 3);
/// ```
pub struct DqnAgent<Q: QFunction> {
    pub online: Q,
    pub target: Q,
    pub optimizer: Adam,
    pub loss: HuberLoss,
    /// Discount factor
    pub gamma: f32,
    pub learning_rate: f32,
    /// Number of gradient steps applied to `online`
    pub train_steps: usize,
}

impl<Q: QFunction> DqnAgent<Q> {
    /// Create an agent with Adam and a unit Huber loss. The target
    /// estimator starts as a copy of the online one.
    pub fn new(online: Q, target: Q, gamma: f32, learning_rate: f32) -> Result<Self> {
        DqnAgentBuilder::new()
            .gamma(gamma)
            .learning_rate(learning_rate)
            .build(online, target)
    }

    pub fn num_actions(&self) -> usize {
        self.online.num_actions()
    }

    /// Action with the highest online value; the first index wins ties.
    pub fn greedy_action(&self, observation: ArrayView3<u8>) -> Result<usize> {
        let batch = observation.mapv(f32::from).insert_axis(Axis(0));
        let q_values = self.online.evaluate(batch.view())?;
        argmax_rows(q_values.view())
            .first()
            .copied()
            .ok_or_else(|| DqnError::NumericalError("estimator returned no values".to_string()))
    }

    /// Epsilon-greedy action selection
    pub fn act<R: Rng + ?Sized>(&self, observation: ArrayView3<u8>, epsilon: f32, rng: &mut R) -> Result<usize> {
        if rng.gen::<f32>() < epsilon {
            Ok(rng.gen_range(0..self.num_actions()))
        } else {
            self.greedy_action(observation)
        }
    }

    /// Bootstrap targets for a batch, computed from the target estimator.
    pub fn targets(&self, batch: &Batch) -> Result<Array1<f32>> {
        let next_q = self.target.evaluate(batch.next_observations.view())?;
        let next_max = max_rows(next_q.view());
        Ok(compute_targets(batch.rewards.view(), batch.dones.view(), next_max.view(), self.gamma))
    }

    /// One gradient step on the online estimator. Returns the batch loss.
    pub fn learn(&mut self, batch: &Batch) -> Result<f32> {
        if batch.is_empty() {
            return Err(DqnError::EmptyBuffer("no transitions to learn from".to_string()));
        }
        let targets = self.targets(batch)?;
        let (loss, gradients) = self.online.loss_and_gradients(
            batch.observations.view(),
            &batch.actions,
            targets.view(),
            &self.loss,
        )?;
        self.online
            .apply_gradients(&gradients, &mut self.optimizer, self.learning_rate)?;
        self.train_steps += 1;
        Ok(loss)
    }

    /// Overwrite the target parameters with the online parameters.
    pub fn sync_target(&mut self) -> Result<()> {
        let params = self.online.parameters();
        self.target.load_parameters(&params)
    }
}

/// `reward + gamma * max_next_q`, or exactly `reward` where `done` is set.
pub fn compute_targets(
    rewards: ArrayView1<f32>,
    dones: ArrayView1<f32>,
    next_max_q: ArrayView1<f32>,
    gamma: f32,
) -> Array1<f32> {
    let mut targets = Array1::zeros(rewards.len());
    Zip::from(&mut targets)
        .and(&rewards)
        .and(&dones)
        .and(&next_max_q)
        .for_each(|t, &r, &d, &q| {
            *t = if d > 0.0 { r } else { r + gamma * q };
        });
    targets
}

/// Builder pattern for DqnAgent
pub struct DqnAgentBuilder {
    gamma: f32,
    learning_rate: f32,
    huber_delta: f32,
}

impl DqnAgentBuilder {
    pub fn new() -> Self {
        DqnAgentBuilder {
            gamma: 0.99,
            learning_rate: 1.25e-4,
            huber_delta: 1.0,
        }
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn huber_delta(mut self, delta: f32) -> Self {
        self.huber_delta = delta;
        self
    }

    pub fn build<Q: QFunction>(self, online: Q, mut target: Q) -> Result<DqnAgent<Q>> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::invalid_parameter(
                "gamma".to_string(),
                format!("must be in [0, 1], got {}", self.gamma),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !(self.huber_delta > 0.0) {
            return Err(DqnError::invalid_parameter(
                "huber_delta".to_string(),
                format!("must be positive, got {}", self.huber_delta),
            ));
        }
        if online.num_actions() != target.num_actions() {
            return Err(DqnError::dimension_mismatch(
                format!("target with {} actions", online.num_actions()),
                format!("{} actions", target.num_actions()),
            ));
        }

        target.load_parameters(&online.parameters())?;

        Ok(DqnAgent {
            online,
            target,
            optimizer: Adam::default(),
            loss: HuberLoss::new(self.huber_delta),
            gamma: self.gamma,
            learning_rate: self.learning_rate,
            train_steps: 0,
        })
    }
}

impl Default for DqnAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
