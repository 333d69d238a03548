//! Side effects of training that live outside the learning loop:
//! checkpoints of the best estimator and the reward curve.
//!
//! The trainer only talks to the [`Reporter`] trait, so the loop runs in
//! tests without touching the filesystem.

use std::fs;
use std::path::PathBuf;
use log::{debug, info};

use crate::agent::QFunction;
use crate::error::Result;
use crate::visualization::{plot_reward_curve, plot_series};

pub trait Reporter {
    /// Persist the online estimator after an episode set a new best reward.
    fn save_checkpoint(&mut self, estimator: &dyn QFunction, best_reward: f32) -> Result<()>;

    /// Publish the smoothed reward history (one value per report window).
    fn report_progress(&mut self, smoothed_rewards: &[f32]) -> Result<()>;
}

/// File name of the checkpoint for a given best reward
pub fn checkpoint_file_name(best_reward: f32) -> String {
    format!("best_model_{}.bin", best_reward)
}

/// Writes checkpoints to `checkpoint_dir` and the reward curve to `plot_path`.
pub struct FileReporter {
    pub checkpoint_dir: PathBuf,
    pub plot_path: PathBuf,
}

impl FileReporter {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(checkpoint_dir: P, plot_path: Q) -> Self {
        FileReporter {
            checkpoint_dir: checkpoint_dir.into(),
            plot_path: plot_path.into(),
        }
    }

    pub fn checkpoint_path(&self, best_reward: f32) -> PathBuf {
        self.checkpoint_dir.join(checkpoint_file_name(best_reward))
    }
}

impl Reporter for FileReporter {
    fn save_checkpoint(&mut self, estimator: &dyn QFunction, best_reward: f32) -> Result<()> {
        fs::create_dir_all(&self.checkpoint_dir)?;
        let path = self.checkpoint_path(best_reward);
        estimator.save(&path)?;
        info!("saved checkpoint {} (best reward {})", path.display(), best_reward);
        Ok(())
    }

    fn report_progress(&mut self, smoothed_rewards: &[f32]) -> Result<()> {
        debug!("\n{}", plot_series(smoothed_rewards, "Average Reward per Episode", 60, 15));
        let written = plot_reward_curve(&self.plot_path, smoothed_rewards)?;
        debug!("reward curve written to {}", written.display());
        Ok(())
    }
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn save_checkpoint(&mut self, _estimator: &dyn QFunction, _best_reward: f32) -> Result<()> {
        Ok(())
    }

    fn report_progress(&mut self, _smoothed_rewards: &[f32]) -> Result<()> {
        Ok(())
    }
}
