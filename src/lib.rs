// Core modules
pub mod config;
pub mod control;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;
pub mod web;

// Re-export commonly used types
pub use control::BotController;
pub use error::{ConfigError, ControlError, ExchangeError, OrderError};
pub use exchange::ExchangeGateway;
pub use models::*;
