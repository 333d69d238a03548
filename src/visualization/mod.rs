pub mod plot;
pub mod text_plots;

pub use plot::plot_reward_curve;
pub use text_plots::{plot_series, training_progress};
