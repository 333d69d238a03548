pub mod tracker;
pub mod statistics;

pub use tracker::RewardTracker;
pub use statistics::{count_non_finite, parameter_norms, Statistics};
