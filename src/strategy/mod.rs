// Baseline derivation and the buy/sell rules
pub mod baseline;
pub mod signals;

pub use baseline::BaselineTracker;
pub use signals::SignalConfig;
