// Price indicators used to derive baselines
pub mod moving_average;

pub use moving_average::{calculate_mean, calculate_sma};
