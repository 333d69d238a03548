use ndarray::{Array1, Array4, Axis};
use rand::Rng;

use crate::env::Observation;
use crate::error::{DqnError, Result};

/// One environment step as stored for learning.
///
/// `reward` is already clipped and `done` marks a life-loss boundary, not
/// the end of the emulator episode.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub action: usize,
    pub reward: f32,
    pub next_observation: Observation,
    pub done: bool,
}

/// Fixed-capacity ring of transitions.
///
/// Observations are reference counted, so consecutive transitions share the
/// frame stack that is `next_observation` of one and `observation` of the
/// next without copying pixels.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: Vec<Transition>,
    capacity: usize,
    position: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity: capacity.max(1),
            position: 0,
        }
    }

    /// Store a transition, overwriting the oldest one once full.
    pub fn add(&mut self, transition: Transition) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Draw `batch_size` transitions uniformly with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if self.buffer.is_empty() {
            return Err(DqnError::EmptyBuffer("cannot sample from an empty replay buffer".to_string()));
        }
        Ok((0..batch_size)
            .map(|_| &self.buffer[rng.gen_range(0..self.buffer.len())])
            .collect())
    }

    /// Stored transitions from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.buffer.len() < self.capacity { 0 } else { self.position };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A sampled minibatch laid out for the estimator.
pub struct Batch {
    /// `[batch, frames, height, width]`, raw pixel values
    pub observations: Array4<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub next_observations: Array4<f32>,
    /// 1.0 where the transition ended a life, 0.0 otherwise
    pub dones: Array1<f32>,
}

impl Batch {
    pub fn from_transitions(transitions: &[&Transition]) -> Result<Self> {
        let first = transitions
            .first()
            .ok_or_else(|| DqnError::EmptyBuffer("cannot build an empty batch".to_string()))?;
        let (c, h, w) = first.observation.dim();
        let n = transitions.len();

        let mut observations = Array4::zeros((n, c, h, w));
        let mut next_observations = Array4::zeros((n, c, h, w));
        for (i, t) in transitions.iter().enumerate() {
            if t.observation.dim() != (c, h, w) || t.next_observation.dim() != (c, h, w) {
                return Err(DqnError::dimension_mismatch(
                    format!("observations of shape {:?}", (c, h, w)),
                    format!("{:?} / {:?}", t.observation.dim(), t.next_observation.dim()),
                ));
            }
            observations
                .index_axis_mut(Axis(0), i)
                .assign(&t.observation.mapv(f32::from));
            next_observations
                .index_axis_mut(Axis(0), i)
                .assign(&t.next_observation.mapv(f32::from));
        }

        Ok(Batch {
            observations,
            actions: transitions.iter().map(|t| t.action).collect(),
            rewards: transitions.iter().map(|t| t.reward).collect(),
            next_observations,
            dones: transitions.iter().map(|t| if t.done { 1.0 } else { 0.0 }).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
