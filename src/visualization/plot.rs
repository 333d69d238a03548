//! Reward curve figure (SVG output)
//!
//! The SVG backend needs no system fonts, so plotting works on headless
//! training machines.

use std::fs;
use std::path::{Path, PathBuf};
use plotters::prelude::*;

use crate::error::{DqnError, Result};

pub const REWARD_PLOT_TITLE: &str = "Average Reward on Breakout";
pub const REWARD_PLOT_X_LABEL: &str = "Training Epochs";
pub const REWARD_PLOT_Y_LABEL: &str = "Average Reward per Episode";

fn plot_error<E: std::fmt::Display>(err: E) -> DqnError {
    DqnError::IoError(format!("plotting failed: {}", err))
}

/// Draw the smoothed reward history (one point per report window) and
/// return the path actually written. A `.png` path is rewritten to `.svg`.
pub fn plot_reward_curve(path: &Path, smoothed_rewards: &[f32]) -> Result<PathBuf> {
    let svg_path = if path.extension().map(|e| e == "png").unwrap_or(false) {
        path.with_extension("svg")
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = svg_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    draw_reward_curve(&svg_path, smoothed_rewards)?;
    Ok(svg_path)
}

fn draw_reward_curve(svg_path: &Path, smoothed_rewards: &[f32]) -> Result<()> {
    let root = SVGBackend::new(svg_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    if smoothed_rewards.is_empty() {
        root.draw(&Text::new(
            "No reward data",
            (400, 250),
            ("sans-serif", 20).into_font().color(&BLACK),
        ))
        .map_err(plot_error)?;
        root.present().map_err(plot_error)?;
        return Ok(());
    }

    let (min_reward, max_reward) = smoothed_rewards
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &r| (min.min(r), max.max(r)));
    let margin = ((max_reward - min_reward) * 0.1).max(0.5);
    let x_max = smoothed_rewards.len().max(2) - 1;

    let mut chart = ChartBuilder::on(&root)
        .caption(REWARD_PLOT_TITLE, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..x_max, (min_reward - margin)..(max_reward + margin))
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc(REWARD_PLOT_X_LABEL)
        .y_desc(REWARD_PLOT_Y_LABEL)
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            smoothed_rewards.iter().enumerate().map(|(i, &r)| (i, r)),
            &BLUE,
        ))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)
}
