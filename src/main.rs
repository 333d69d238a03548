//! Train a DQN agent on the pixel catch game.
//!
//! Hyperparameters come from the JSON file named by `DQN_CONFIG`, or the
//! Atari defaults when it is unset. Log verbosity follows `RUST_LOG`.

use std::env;
use std::process;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use atari_dqn::config::TrainingConfig;
use atari_dqn::env::{Environment, PixelCatch, PixelCatchConfig};
use atari_dqn::error::Result;
use atari_dqn::network::{NetworkConfig, QNetwork};
use atari_dqn::reporter::FileReporter;
use atari_dqn::trainer::Trainer;

const CONFIG_VAR: &str = "DQN_CONFIG";

fn load_config() -> Result<TrainingConfig> {
    match env::var(CONFIG_VAR) {
        Ok(path) => {
            info!("loading configuration from {}", path);
            TrainingConfig::from_json_file(&path).map_err(|e| e.context(format!("reading {}", path)))
        }
        Err(_) => Ok(TrainingConfig::default()),
    }
}

fn train() -> Result<()> {
    let config = load_config()?;
    config.validate()?;

    let env = PixelCatch::new(PixelCatchConfig { seed: config.seed, ..PixelCatchConfig::default() })?;
    let network_config = NetworkConfig::atari(env.num_actions());

    let mut rng = StdRng::seed_from_u64(config.seed);
    let online = QNetwork::new(network_config, &mut rng)?;
    let target = QNetwork::new(network_config, &mut rng)?;
    info!(
        "Q-network with {} parameters, {} actions",
        online.parameter_count(),
        network_config.num_actions
    );

    let reporter = FileReporter::new(&config.checkpoint_dir, &config.plot_path);

    let progress = ProgressBar::new(config.nb_epochs as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut trainer = Trainer::new(config, env, online, target, reporter)?.with_progress(progress);
    trainer.run()?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = train() {
        error!("training aborted: {}", e);
        process::exit(1);
    }
}
