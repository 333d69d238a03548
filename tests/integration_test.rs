use std::path::Path;
use std::sync::Arc;

use atari_dqn::{
    agent::QFunction,
    config::TrainingConfig,
    env::{Environment, Observation, PixelCatch, PixelCatchConfig, StepInfo, StepResult},
    error::{DqnError, Result},
    loss::Loss,
    metrics::count_non_finite,
    network::{NetworkConfig, ParameterSet, QNetwork},
    optimizer::Optimizer,
    reporter::{FileReporter, NullReporter, Reporter},
    trainer::Trainer,
};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView4, Ix1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

const FRAME: (usize, usize, usize) = (4, 36, 36);

/// Scripted episodes: one warm-up step, then `steps` inner steps. The last
/// inner step is terminal and pays `final_rewards[episode]`.
struct StubEnv {
    steps: usize,
    final_rewards: Vec<f32>,
    /// Inner step (1-based) after which a life is lost
    life_loss_at: Option<usize>,
    first_reward: f32,
    fail_at: Option<usize>,
    episode: usize,
    t: usize,
    lives: u32,
    total_steps: usize,
    observation: Observation,
}

impl StubEnv {
    fn new(steps: usize) -> Self {
        StubEnv {
            steps,
            final_rewards: vec![],
            life_loss_at: None,
            first_reward: 0.0,
            fail_at: None,
            episode: 0,
            t: 0,
            lives: 3,
            total_steps: 0,
            observation: Arc::new(Array3::zeros(FRAME)),
        }
    }
}

impl Environment for StubEnv {
    fn num_actions(&self) -> usize {
        3
    }

    fn reset(&mut self) -> Result<Observation> {
        self.t = 0;
        self.lives = 3;
        Ok(Arc::clone(&self.observation))
    }

    fn step(&mut self, action: usize) -> Result<StepResult> {
        if action >= 3 {
            return Err(DqnError::InvalidAction { action, max_actions: 3 });
        }
        self.total_steps += 1;
        if Some(self.total_steps) == self.fail_at {
            return Err(DqnError::Environment("emulator crashed".to_string()));
        }

        self.t += 1;
        // t == 1 is the warm-up step
        let inner = self.t - 1;
        if Some(inner) == self.life_loss_at {
            self.lives -= 1;
        }
        let terminal = inner == self.steps;
        let reward = if terminal {
            let r = self.final_rewards.get(self.episode).copied().unwrap_or(0.0);
            self.episode += 1;
            r
        } else if inner == 1 {
            self.first_reward
        } else {
            0.0
        };

        Ok(StepResult {
            observation: Arc::new(Array3::from_elem(FRAME, inner as u8)),
            reward,
            terminal,
            info: StepInfo { lives: self.lives },
        })
    }
}

/// One learnable value per action, independent of the observation.
struct BiasQ {
    bias: Array1<f32>,
}

impl BiasQ {
    fn new() -> Self {
        BiasQ { bias: Array1::zeros(3) }
    }

    fn with_bias(bias: [f32; 3]) -> Self {
        BiasQ { bias: Array1::from(bias.to_vec()) }
    }
}

impl QFunction for BiasQ {
    fn num_actions(&self) -> usize {
        self.bias.len()
    }

    fn evaluate(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        let batch = observations.shape()[0];
        Ok(Array2::from_shape_fn((batch, self.bias.len()), |(_, a)| self.bias[a]))
    }

    fn loss_and_gradients(
        &self,
        _observations: ArrayView4<f32>,
        actions: &[usize],
        targets: ArrayView1<f32>,
        loss: &dyn Loss,
    ) -> Result<(f32, ParameterSet)> {
        let predicted: Array1<f32> = actions.iter().map(|&a| self.bias[a]).collect();
        let grad = loss.gradient(predicted.view(), targets);
        let mut bias_grad = Array1::zeros(self.bias.len());
        for (&a, g) in actions.iter().zip(grad.iter()) {
            bias_grad[a] += g;
        }
        let mut gradients = ParameterSet::new();
        gradients.insert("bias".to_string(), bias_grad.into_dyn());
        Ok((loss.compute(predicted.view(), targets), gradients))
    }

    fn apply_gradients(
        &mut self,
        gradients: &ParameterSet,
        optimizer: &mut dyn Optimizer,
        learning_rate: f32,
    ) -> Result<()> {
        optimizer.begin_step();
        optimizer.update("bias", self.bias.view_mut().into_dyn(), gradients["bias"].view(), learning_rate)
    }

    fn parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert("bias".to_string(), self.bias.clone().into_dyn());
        params
    }

    fn load_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        let bias = params["bias"]
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| DqnError::NumericalError(e.to_string()))?;
        self.bias.assign(&bias);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, format!("{:?}", self.bias.to_vec()))?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReporter {
    checkpoints: Vec<f32>,
    reports: Vec<Vec<f32>>,
    fail: bool,
}

impl Reporter for RecordingReporter {
    fn save_checkpoint(&mut self, _estimator: &dyn QFunction, best_reward: f32) -> Result<()> {
        self.checkpoints.push(best_reward);
        if self.fail {
            return Err(DqnError::IoError("disk full".to_string()));
        }
        Ok(())
    }

    fn report_progress(&mut self, smoothed_rewards: &[f32]) -> Result<()> {
        self.reports.push(smoothed_rewards.to_vec());
        if self.fail {
            return Err(DqnError::IoError("disk full".to_string()));
        }
        Ok(())
    }
}

fn test_config() -> TrainingConfig {
    TrainingConfig {
        buffer_size: 100,
        nb_epochs: 1_000,
        train_frequency: 1,
        batch_size: 2,
        replay_start_size: 0,
        exploration_steps: 10,
        target_sync_interval: 10_000,
        report_interval: 50_000,
        max_noop_steps: 1,
        ..TrainingConfig::default()
    }
}

fn small_networks(num_actions: usize) -> (QNetwork, QNetwork) {
    let mut rng = StdRng::seed_from_u64(0);
    let config = NetworkConfig { in_channels: 4, height: 36, width: 36, num_actions };
    (QNetwork::new(config, &mut rng).unwrap(), QNetwork::new(config, &mut rng).unwrap())
}

#[test]
fn test_one_episode_learns_every_step_after_start() {
    let (online, target) = small_networks(3);
    let mut trainer = Trainer::new(test_config(), StubEnv::new(5), online, target, NullReporter).unwrap();

    let reward = trainer.run_episode().unwrap();

    let state = trainer.state();
    assert_eq!(reward, 0.0);
    assert_eq!(state.step, 5);
    assert_eq!(state.episodes, 1);
    // Step 0 is not past replay_start_size = 0
    assert_eq!(state.learning_steps, 4);
    assert_eq!(trainer.agent().train_steps, 4);
    assert_eq!(state.target_syncs, 1);
    assert_eq!(trainer.buffer().len(), 5);
}

fn cadence_config() -> TrainingConfig {
    TrainingConfig {
        replay_start_size: 2,
        train_frequency: 2,
        target_sync_interval: 3,
        ..test_config()
    }
}

#[test]
fn test_learning_and_sync_cadence() {
    // Steps 0..=9: learn at 4, 6, 8 (strictly past step 2), sync at 0, 3, 6, 9
    let online = BiasQ::with_bias([0.5, 0.2, 0.1]);
    let target = BiasQ::new();
    let mut trainer = Trainer::new(cadence_config(), StubEnv::new(10), online, target, NullReporter).unwrap();

    trainer.run_episode().unwrap();

    let state = trainer.state();
    assert_eq!(state.step, 10);
    assert_eq!(state.learning_steps, 3);
    assert_eq!(trainer.agent().train_steps, 3);
    assert_eq!(state.target_syncs, 4);
    // Step 9 syncs after the last update at step 8
    assert_eq!(trainer.agent().target.parameters(), trainer.agent().online.parameters());
}

#[test]
fn test_target_frozen_between_syncs() {
    // Steps 0..=8: the update at step 8 comes after the last sync at step 6
    let online = BiasQ::with_bias([0.5, 0.2, 0.1]);
    let target = BiasQ::new();
    let mut trainer = Trainer::new(cadence_config(), StubEnv::new(9), online, target, NullReporter).unwrap();

    trainer.run_episode().unwrap();

    let state = trainer.state();
    assert_eq!(state.learning_steps, 3);
    assert_eq!(state.target_syncs, 3);
    assert_ne!(trainer.agent().target.parameters(), trainer.agent().online.parameters());
}

#[test]
fn test_no_learning_at_replay_start_step() {
    // replay_start_size = 4 with train_frequency = 2: step 4 does not learn, step 6 does
    let config = TrainingConfig { replay_start_size: 4, ..cadence_config() };
    let mut trainer = Trainer::new(config, StubEnv::new(7), BiasQ::new(), BiasQ::new(), NullReporter).unwrap();

    trainer.run_episode().unwrap();

    assert_eq!(trainer.state().learning_steps, 1);
}

#[test]
fn test_diverged_loss_is_fatal() {
    let online = BiasQ::with_bias([f32::NAN; 3]);
    let mut trainer = Trainer::new(test_config(), StubEnv::new(5), online, BiasQ::new(), NullReporter).unwrap();

    match trainer.run_episode() {
        Err(DqnError::NumericalError(msg)) => {
            assert!(msg.starts_with("learning step failed at step 1"), "{}", msg);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_checkpoints_only_on_strictly_better_rewards() {
    let mut env = StubEnv::new(1);
    env.final_rewards = vec![2.0, 5.0, 3.0, 7.0];
    let config = TrainingConfig { nb_epochs: 3, ..test_config() };
    let mut trainer = Trainer::new(config, env, BiasQ::new(), BiasQ::new(), RecordingReporter::default()).unwrap();

    let state = trainer.run().unwrap();

    assert_eq!(state.episodes, 4);
    assert_eq!(state.step, 4);
    assert_eq!(trainer.reporter().checkpoints, vec![2.0, 5.0, 7.0]);
    assert_eq!(trainer.tracker().best_reward(), 7.0);
}

#[test]
fn test_life_loss_marks_done_and_rewards_are_clipped() {
    let mut env = StubEnv::new(4);
    env.life_loss_at = Some(2);
    env.first_reward = 4.0;
    env.final_rewards = vec![-3.0];
    let config = TrainingConfig { replay_start_size: 1_000, ..test_config() };
    let mut trainer = Trainer::new(config, env, BiasQ::new(), BiasQ::new(), NullReporter).unwrap();

    let reward = trainer.run_episode().unwrap();

    assert_eq!(reward, 1.0);
    let dones: Vec<bool> = trainer.buffer().iter().map(|t| t.done).collect();
    assert_eq!(dones, vec![false, true, false, false]);
    let rewards: Vec<f32> = trainer.buffer().iter().map(|t| t.reward).collect();
    assert_eq!(rewards, vec![1.0, 0.0, 0.0, -1.0]);
    assert_eq!(trainer.state().learning_steps, 0);
}

#[test]
fn test_transitions_chain_observations() {
    let config = TrainingConfig { replay_start_size: 1_000, ..test_config() };
    let mut trainer = Trainer::new(config, StubEnv::new(3), BiasQ::new(), BiasQ::new(), NullReporter).unwrap();
    trainer.run_episode().unwrap();

    let stored: Vec<_> = trainer.buffer().iter().collect();
    for pair in stored.windows(2) {
        assert!(Arc::ptr_eq(&pair[0].next_observation, &pair[1].observation));
    }
    assert_eq!(stored[2].next_observation[[0, 0, 0]], 3);
}

#[test]
fn test_reports_skip_empty_windows() {
    let mut env = StubEnv::new(5);
    env.final_rewards = vec![1.0, 1.0];
    let config = TrainingConfig { nb_epochs: 9, report_interval: 2, replay_start_size: 1_000, ..test_config() };
    let mut trainer = Trainer::new(config, env, BiasQ::new(), BiasQ::new(), RecordingReporter::default()).unwrap();

    trainer.run().unwrap();

    assert_eq!(trainer.state().step, 10);
    assert_eq!(trainer.reporter().reports, vec![vec![1.0]]);
    assert_eq!(trainer.tracker().smoothed_rewards(), &[1.0]);
}

#[test]
fn test_reporter_failures_do_not_stop_training() {
    let mut env = StubEnv::new(2);
    env.final_rewards = vec![1.0, 2.0];
    let config = TrainingConfig { nb_epochs: 3, report_interval: 2, ..test_config() };
    let reporter = RecordingReporter { fail: true, ..RecordingReporter::default() };
    let mut trainer = Trainer::new(config, env, BiasQ::new(), BiasQ::new(), reporter).unwrap();

    let state = trainer.run().unwrap();

    assert_eq!(state.episodes, 2);
    assert_eq!(trainer.reporter().checkpoints, vec![1.0, 2.0]);
}

#[test]
fn test_environment_failure_is_fatal_with_step_context() {
    let mut env = StubEnv::new(10);
    // Call 1 is the warm-up, calls 2.. are inner steps 0..
    env.fail_at = Some(4);
    let mut trainer = Trainer::new(test_config(), env, BiasQ::new(), BiasQ::new(), NullReporter).unwrap();

    match trainer.run() {
        Err(DqnError::Environment(msg)) => {
            assert_eq!(msg, "environment step failed at step 2: emulator crashed");
        }
        other => panic!("unexpected result: {:?}", other.map(|s| s.step)),
    }
}

#[test]
fn test_trainer_rejects_invalid_setup() {
    let config = TrainingConfig { fire_action: 7, ..test_config() };
    assert!(matches!(
        Trainer::new(config, StubEnv::new(1), BiasQ::new(), BiasQ::new(), NullReporter),
        Err(DqnError::InvalidAction { action: 7, .. })
    ));

    let config = TrainingConfig { batch_size: 0, ..test_config() };
    assert!(Trainer::new(config, StubEnv::new(1), BiasQ::new(), BiasQ::new(), NullReporter).is_err());
}

#[test]
fn test_file_reporter_checkpoint_round_trip() {
    let dir = tempdir().unwrap();
    let mut env = StubEnv::new(2);
    env.final_rewards = vec![2.0];
    let config = TrainingConfig { replay_start_size: 1_000, ..test_config() };
    let reporter = FileReporter::new(dir.path().join("checkpoints"), dir.path().join("Imgs/curve.svg"));
    let (online, target) = small_networks(3);
    let mut trainer = Trainer::new(config, env, online, target, reporter).unwrap();

    trainer.run_episode().unwrap();

    let path = dir.path().join("checkpoints").join("best_model_2.bin");
    let restored = QNetwork::load(&path).unwrap();
    assert_eq!(restored.parameters(), trainer.agent().online.parameters());
}

#[test]
fn test_training_on_pixel_catch() {
    let env_config = PixelCatchConfig { height: 36, width: 36, seed: 3, ..PixelCatchConfig::default() };
    let env = PixelCatch::new(env_config).unwrap();
    let config = TrainingConfig {
        nb_epochs: 150,
        train_frequency: 4,
        batch_size: 4,
        replay_start_size: 20,
        exploration_steps: 100,
        target_sync_interval: 25,
        max_noop_steps: 3,
        ..test_config()
    };
    let (online, target) = small_networks(4);
    let mut trainer = Trainer::new(config, env, online, target, NullReporter).unwrap();

    let state = trainer.run().unwrap();

    assert!(state.step > 150);
    assert!(state.learning_steps > 0);
    assert!(state.target_syncs >= 6);
    assert!(trainer.tracker().avg_loss(10).map(f32::is_finite).unwrap_or(false));
    assert_eq!(count_non_finite(&trainer.agent().online.parameters()), 0);
}
