use serde::{Serialize, Deserialize};

/// Linear epsilon decay for epsilon-greedy exploration.
///
/// `value(step)` falls linearly from `start` to `end` over
/// `exploration_steps` steps and stays at `end` afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    pub start: f32,
    pub end: f32,
    pub exploration_steps: usize,
}

impl EpsilonSchedule {
    pub fn new(start: f32, end: f32, exploration_steps: usize) -> Self {
        EpsilonSchedule {
            start,
            end,
            exploration_steps,
        }
    }

    /// Exploration probability at the given global step
    pub fn value(&self, step: usize) -> f32 {
        if self.exploration_steps == 0 {
            return self.end;
        }
        let progress = step.min(self.exploration_steps) as f64 / self.exploration_steps as f64;
        let epsilon = self.start as f64 + (self.end as f64 - self.start as f64) * progress;
        (epsilon as f32).max(self.end)
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule::new(1.0, 0.1, 1_000_000)
    }
}
