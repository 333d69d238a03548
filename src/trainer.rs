//! The DQN training loop
//!
//! One `Trainer` owns everything that changes during a run: the agent and
//! its two estimators, the replay buffer, the reward tracker, the random
//! source and the step counters. Nothing is shared, so no locking is needed.
//!
//! Per environment step the loop does, in order: pick an epsilon-greedy
//! action, step the environment, flag a life loss as `done`, store the
//! clipped transition, learn every `train_frequency` steps once past
//! `replay_start_size`, sync the target every `target_sync_interval` steps,
//! then advance the step counter and report every `report_interval` steps.
//!
//! A non-finite loss stops training, and so do non-finite online
//! parameters, which are checked every 1000 learning steps.

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::agent::{DqnAgent, DqnAgentBuilder, QFunction};
use crate::config::TrainingConfig;
use crate::env::{clip_reward, Environment, Observation};
use crate::error::{DqnError, Result};
use crate::metrics::{count_non_finite, parameter_norms, RewardTracker};
use crate::replay_buffer::{Batch, ReplayBuffer, Transition};
use crate::reporter::Reporter;
use crate::schedule::EpsilonSchedule;
use crate::visualization::training_progress;

/// Learning steps between two debug loss lines
const LOSS_LOG_INTERVAL: usize = 1_000;

/// Counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingState {
    /// Global environment step counter (warm-up steps excluded)
    pub step: usize,
    pub episodes: usize,
    pub learning_steps: usize,
    pub target_syncs: usize,
}

pub struct Trainer<E: Environment, Q: QFunction, R: Reporter> {
    config: TrainingConfig,
    env: E,
    agent: DqnAgent<Q>,
    buffer: ReplayBuffer,
    schedule: EpsilonSchedule,
    tracker: RewardTracker,
    reporter: R,
    rng: StdRng,
    state: TrainingState,
    progress: ProgressBar,
}

impl<E: Environment, Q: QFunction, R: Reporter> Trainer<E, Q, R> {
    /// Build a trainer. `target` is overwritten with the parameters of
    /// `online` before anything else happens.
    pub fn new(config: TrainingConfig, env: E, online: Q, target: Q, reporter: R) -> Result<Self> {
        config.validate()?;
        if env.num_actions() != online.num_actions() {
            return Err(DqnError::dimension_mismatch(
                format!("estimator with {} actions", env.num_actions()),
                format!("{} actions", online.num_actions()),
            ));
        }
        if config.fire_action >= env.num_actions() {
            return Err(DqnError::InvalidAction {
                action: config.fire_action,
                max_actions: env.num_actions(),
            });
        }

        let agent = DqnAgentBuilder::new()
            .gamma(config.gamma)
            .learning_rate(config.learning_rate)
            .build(online, target)?;

        Ok(Trainer {
            buffer: ReplayBuffer::new(config.buffer_size),
            schedule: config.epsilon_schedule(),
            tracker: RewardTracker::default(),
            rng: StdRng::seed_from_u64(config.seed),
            state: TrainingState::default(),
            progress: ProgressBar::hidden(),
            config,
            env,
            agent,
            reporter,
        })
    }

    /// Drive `progress` with the global step; its length is set to the
    /// step budget.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_length(self.config.nb_epochs as u64);
        self.progress = progress;
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn agent(&self) -> &DqnAgent<Q> {
        &self.agent
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn tracker(&self) -> &RewardTracker {
        &self.tracker
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Play episodes until the global step count exceeds `nb_epochs`.
    /// An episode in progress always finishes.
    pub fn run(&mut self) -> Result<TrainingState> {
        info!(
            "training for {} steps: buffer {}, batch {}, learning starts after {} steps",
            self.config.nb_epochs,
            self.config.buffer_size,
            self.config.batch_size,
            self.config.replay_start_size
        );

        while self.state.step <= self.config.nb_epochs {
            self.run_episode()?;
        }

        self.progress.finish();
        info!(
            "training finished after {} steps and {} episodes, best reward {}",
            self.state.step,
            self.state.episodes,
            self.tracker.best_reward()
        );
        Ok(self.state)
    }

    /// Play one full episode and return its raw reward.
    pub fn run_episode(&mut self) -> Result<f32> {
        let episode = self.state.episodes;
        self.tracker.start_episode();

        if let Some((mut observation, mut lives)) = self.warm_up(episode)? {
            let mut terminal = false;
            while !terminal {
                let (next, next_lives, dead) = self.step(observation, lives)?;
                observation = next;
                lives = next_lives;
                terminal = dead;
            }
        }

        Ok(self.finish_episode())
    }

    /// Reset and issue between 1 and `max_noop_steps` fire actions. Returns
    /// the observation and lives to start from, or `None` when the
    /// environment terminated during the warm-up.
    fn warm_up(&mut self, episode: usize) -> Result<Option<(Observation, u32)>> {
        let mut observation = self
            .env
            .reset()
            .map_err(|e| e.context(format!("environment reset failed before episode {}", episode)))?;

        let noop_steps = self.rng.gen_range(1..=self.config.max_noop_steps);
        let mut lives = 0;
        for _ in 0..noop_steps {
            let result = self.env.step(self.config.fire_action).map_err(|e| {
                e.context(format!("warm-up step failed in episode {}", episode))
            })?;
            observation = result.observation;
            lives = result.info.lives;
            if result.terminal {
                debug!("episode {} ended during its {} warm-up steps", episode, noop_steps);
                return Ok(None);
            }
        }
        Ok(Some((observation, lives)))
    }

    /// One environment step of the inner loop. Returns the next observation,
    /// the remaining lives and the terminal flag.
    fn step(&mut self, observation: Observation, lives: u32) -> Result<(Observation, u32, bool)> {
        let step = self.state.step;

        let epsilon = self.schedule.value(step);
        let action = self
            .agent
            .act(observation.view(), epsilon, &mut self.rng)
            .map_err(|e| e.context(format!("action selection failed at step {}", step)))?;

        let result = self
            .env
            .step(action)
            .map_err(|e| e.context(format!("environment step failed at step {}", step)))?;

        // A lost life ends the bootstrap, not the episode.
        let done = result.info.lives < lives;
        self.tracker.record_step(result.reward);

        self.buffer.add(Transition {
            observation,
            action,
            reward: clip_reward(result.reward),
            next_observation: result.observation.clone(),
            done,
        });

        if step > self.config.replay_start_size && step % self.config.train_frequency == 0 {
            self.learning_step()
                .map_err(|e| e.context(format!("learning step failed at step {}", step)))?;
        }

        if step % self.config.target_sync_interval == 0 {
            self.agent
                .sync_target()
                .map_err(|e| e.context(format!("target sync failed at step {}", step)))?;
            self.state.target_syncs += 1;
            debug!("synced target estimator at step {}", step);
        }

        self.state.step += 1;
        if self.state.step % self.config.report_interval == 0 {
            self.report();
        }
        self.progress.set_position(self.state.step as u64);

        Ok((result.observation, result.info.lives, result.terminal))
    }

    fn learning_step(&mut self) -> Result<f32> {
        let transitions = self.buffer.sample(self.config.batch_size, &mut self.rng)?;
        let batch = Batch::from_transitions(&transitions)?;
        let loss = self.agent.learn(&batch)?;
        if !loss.is_finite() {
            return Err(DqnError::NumericalError(format!("loss diverged to {}", loss)));
        }

        self.state.learning_steps += 1;
        self.tracker.record_loss(loss);
        if self.state.learning_steps % LOSS_LOG_INTERVAL == 0 {
            self.check_parameters()?;
            debug!(
                "learning step {}: loss {:.5} (avg {:.5})",
                self.state.learning_steps,
                loss,
                self.tracker.avg_loss(LOSS_LOG_INTERVAL).unwrap_or(loss)
            );
        }
        Ok(loss)
    }

    /// Fail on NaN or infinite online parameters and log their norms.
    fn check_parameters(&self) -> Result<()> {
        let params = self.agent.online.parameters();
        let non_finite = count_non_finite(&params);
        if non_finite > 0 {
            return Err(DqnError::NumericalError(format!(
                "{} non-finite online parameters after {} learning steps",
                non_finite, self.state.learning_steps
            )));
        }
        for (name, norm) in parameter_norms(&params) {
            debug!("parameter {} norm {:.4}", name, norm);
        }
        Ok(())
    }

    fn finish_episode(&mut self) -> f32 {
        let length = self.tracker.current_episode_length();
        let (reward, new_best) = self.tracker.end_episode();
        self.state.episodes += 1;
        debug!("episode {} finished: reward {} in {} steps", self.state.episodes, reward, length);

        if new_best {
            if let Err(e) = self.reporter.save_checkpoint(&self.agent.online, reward) {
                warn!("failed to save checkpoint for reward {}: {}", reward, e);
            }
        }
        self.progress.set_message(format!("best reward {}", self.tracker.best_reward()));
        reward
    }

    /// Close the reward window and publish the curve. Failures are logged.
    fn report(&mut self) {
        let step = self.state.step;
        let window = self.tracker.window_statistics();
        match self.tracker.close_window() {
            None => debug!("no episode finished in the {} steps before step {}", self.config.report_interval, step),
            Some(mean) => {
                info!(
                    "{} episodes in window: min {} max {} std {:.3}",
                    window.count, window.min, window.max, window.std
                );
                info!(
                    "{}",
                    training_progress(
                        step,
                        self.config.nb_epochs,
                        mean,
                        self.tracker.avg_loss(LOSS_LOG_INTERVAL),
                        self.schedule.value(step),
                    )
                );
                if let Err(e) = self.reporter.report_progress(self.tracker.smoothed_rewards()) {
                    warn!("failed to report progress at step {}: {}", step, e);
                }
            }
        }
    }
}
