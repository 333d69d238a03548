/***
# Catch the falling ball, rendered as pixels.

* The screen is a grayscale image; a ball falls from the top row towards a paddle on the bottom rows.
* Actions: 0 NOOP, 1 FIRE (same as NOOP), 2 RIGHT, 3 LEFT.
* A caught ball gives a reward of +1. A missed ball costs one life.
* The episode ends when no lives are left or after `max_episode_steps` steps.
***/

use std::collections::VecDeque;
use std::sync::Arc;
use ndarray::{stack, Array2, ArrayView2, Axis, s};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};

use crate::env::{Environment, Observation, StepInfo, StepResult};
use crate::error::{DqnError, Result};

const NUM_ACTIONS: usize = 4;
const ACTION_RIGHT: usize = 2;
const ACTION_LEFT: usize = 3;
const BRIGHT: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelCatchConfig {
    pub height: usize,
    pub width: usize,
    /// Frames per observation
    pub frame_stack: usize,
    pub lives: u32,
    pub ball_size: usize,
    /// Rows the ball falls per step
    pub ball_speed: usize,
    pub paddle_width: usize,
    /// Columns the paddle moves per step
    pub paddle_speed: usize,
    pub max_episode_steps: usize,
    pub seed: u64,
}

impl Default for PixelCatchConfig {
    fn default() -> Self {
        PixelCatchConfig {
            height: 84,
            width: 84,
            frame_stack: 4,
            lives: 5,
            ball_size: 4,
            ball_speed: 4,
            paddle_width: 16,
            paddle_speed: 4,
            max_episode_steps: 10_000,
            seed: 0,
        }
    }
}

/// A small pixel game with lives, so the trainer's life-loss handling is
/// exercised without an emulator.
pub struct PixelCatch {
    config: PixelCatchConfig,
    rng: StdRng,
    frames: VecDeque<Array2<u8>>,
    ball_row: usize,
    ball_col: usize,
    paddle_col: usize,
    lives: u32,
    steps: usize,
    started: bool,
}

impl PixelCatch {
    pub fn new(config: PixelCatchConfig) -> Result<Self> {
        if config.frame_stack == 0 || config.lives == 0 || config.ball_speed == 0 {
            return Err(DqnError::invalid_parameter(
                "pixel catch",
                "frame_stack, lives and ball_speed must be non-zero",
            ));
        }
        if config.ball_size == 0
            || config.ball_size > config.width
            || config.paddle_width > config.width
            || config.height < config.ball_size + 2
        {
            return Err(DqnError::invalid_parameter(
                "pixel catch".to_string(),
                format!("objects do not fit a {}x{} screen", config.height, config.width),
            ));
        }

        Ok(PixelCatch {
            rng: StdRng::seed_from_u64(config.seed),
            frames: VecDeque::with_capacity(config.frame_stack),
            ball_row: 0,
            ball_col: 0,
            paddle_col: 0,
            lives: config.lives,
            steps: 0,
            started: false,
            config,
        })
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    /// First row of the two-row paddle
    fn paddle_row(&self) -> usize {
        self.config.height - 2
    }

    fn spawn_ball(&mut self) {
        self.ball_row = 0;
        self.ball_col = self.rng.gen_range(0..=self.config.width - self.config.ball_size);
    }

    fn render(&self) -> Array2<u8> {
        let mut frame = Array2::zeros((self.config.height, self.config.width));
        let size = self.config.ball_size;
        let row_end = (self.ball_row + size).min(self.config.height);
        frame
            .slice_mut(s![self.ball_row..row_end, self.ball_col..self.ball_col + size])
            .fill(BRIGHT);
        let paddle_row = self.paddle_row();
        frame
            .slice_mut(s![paddle_row.., self.paddle_col..self.paddle_col + self.config.paddle_width])
            .fill(BRIGHT);
        frame
    }

    fn push_frame(&mut self, frame: Array2<u8>) {
        if self.frames.len() == self.config.frame_stack {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    fn observation(&self) -> Result<Observation> {
        let views: Vec<ArrayView2<u8>> = self.frames.iter().map(|f| f.view()).collect();
        let stacked = stack(Axis(0), &views).map_err(|e| DqnError::Environment(e.to_string()))?;
        Ok(Arc::new(stacked))
    }

    fn move_paddle(&mut self, action: usize) {
        let max_col = self.config.width - self.config.paddle_width;
        match action {
            ACTION_RIGHT => self.paddle_col = (self.paddle_col + self.config.paddle_speed).min(max_col),
            ACTION_LEFT => self.paddle_col = self.paddle_col.saturating_sub(self.config.paddle_speed),
            _ => {}
        }
    }

    /// Whether the ball overlaps the paddle horizontally.
    fn ball_over_paddle(&self) -> bool {
        let ball_end = self.ball_col + self.config.ball_size;
        let paddle_end = self.paddle_col + self.config.paddle_width;
        self.ball_col < paddle_end && self.paddle_col < ball_end
    }
}

impl Environment for PixelCatch {
    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn reset(&mut self) -> Result<Observation> {
        self.lives = self.config.lives;
        self.steps = 0;
        self.paddle_col = (self.config.width - self.config.paddle_width) / 2;
        self.spawn_ball();
        self.started = true;

        let frame = self.render();
        self.frames.clear();
        for _ in 0..self.config.frame_stack {
            self.push_frame(frame.clone());
        }
        self.observation()
    }

    fn step(&mut self, action: usize) -> Result<StepResult> {
        if !self.started {
            return Err(DqnError::Environment("step called before reset".to_string()));
        }
        if action >= NUM_ACTIONS {
            return Err(DqnError::InvalidAction { action, max_actions: NUM_ACTIONS });
        }

        self.move_paddle(action);
        self.ball_row += self.config.ball_speed;
        self.steps += 1;

        let mut reward = 0.0;
        if self.ball_row + self.config.ball_size > self.paddle_row() {
            if self.ball_over_paddle() {
                reward = 1.0;
            } else {
                self.lives -= 1;
            }
            self.spawn_ball();
        }

        let terminal = self.lives == 0 || self.steps >= self.config.max_episode_steps;
        if terminal {
            self.started = false;
        }

        let frame = self.render();
        self.push_frame(frame);

        Ok(StepResult {
            observation: self.observation()?,
            reward,
            terminal,
            info: StepInfo { lives: self.lives },
        })
    }
}
