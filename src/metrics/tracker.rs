use std::collections::VecDeque;

use crate::metrics::statistics::Statistics;

/// Reward history kept across the whole run
#[derive(Debug, Clone, Default)]
struct RewardHistory {
    /// Raw episode rewards completed since the last report
    pub window_rewards: Vec<f32>,

    /// One mean per closed report window
    pub smoothed_rewards: Vec<f32>,

    /// Recent learning-step losses
    pub losses: VecDeque<f32>,
}

/// Tracks episode returns, the best return so far and the smoothed reward
/// curve reported every fixed number of steps.
pub struct RewardTracker {
    history: RewardHistory,
    loss_history_size: usize,

    current_episode_reward: f32,
    current_episode_length: usize,
    best_reward: f32,
}

impl RewardTracker {
    pub fn new(loss_history_size: usize) -> Self {
        RewardTracker {
            history: RewardHistory::default(),
            loss_history_size: loss_history_size.max(1),
            current_episode_reward: 0.0,
            current_episode_length: 0,
            best_reward: 0.0,
        }
    }

    /// Start a new episode
    pub fn start_episode(&mut self) {
        self.current_episode_reward = 0.0;
        self.current_episode_length = 0;
    }

    /// Accumulate the raw (unclipped) reward of one step
    pub fn record_step(&mut self, raw_reward: f32) {
        self.current_episode_reward += raw_reward;
        self.current_episode_length += 1;
    }

    /// Close the episode. Returns its reward and whether it beat the best
    /// reward so far, which is then updated.
    pub fn end_episode(&mut self) -> (f32, bool) {
        let reward = self.current_episode_reward;
        self.history.window_rewards.push(reward);

        let new_best = reward > self.best_reward;
        if new_best {
            self.best_reward = reward;
        }
        (reward, new_best)
    }

    /// Average the rewards of the current window into the smoothed curve and
    /// start a new window. A window without completed episodes adds nothing,
    /// so after such a window the index into [`smoothed_rewards`] no longer
    /// equals the number of reports made.
    ///
    /// [`smoothed_rewards`]: RewardTracker::smoothed_rewards
    pub fn close_window(&mut self) -> Option<f32> {
        if self.history.window_rewards.is_empty() {
            return None;
        }
        let mean = Statistics::from_slice(&self.history.window_rewards).mean;
        self.history.smoothed_rewards.push(mean);
        self.history.window_rewards.clear();
        Some(mean)
    }

    /// Summary of the rewards in the current window
    pub fn window_statistics(&self) -> Statistics {
        Statistics::from_slice(&self.history.window_rewards)
    }

    pub fn record_loss(&mut self, loss: f32) {
        if self.history.losses.len() >= self.loss_history_size {
            self.history.losses.pop_front();
        }
        self.history.losses.push_back(loss);
    }

    /// Get recent average loss
    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        if self.history.losses.is_empty() || window == 0 {
            return None;
        }

        let n = window.min(self.history.losses.len());
        let sum: f32 = self.history.losses.iter().rev().take(n).sum();
        Some(sum / n as f32)
    }

    pub fn smoothed_rewards(&self) -> &[f32] {
        &self.history.smoothed_rewards
    }

    pub fn best_reward(&self) -> f32 {
        self.best_reward
    }

    /// Steps recorded since the episode started
    pub fn current_episode_length(&self) -> usize {
        self.current_episode_length
    }

}

impl Default for RewardTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}
