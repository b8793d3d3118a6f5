// Order execution, position bookkeeping and the trading loop
pub mod engine;
pub mod executor;
pub mod position_ledger;
pub mod state;

pub use engine::{EngineSettings, TradingEngine};
pub use executor::OrderExecutor;
pub use position_ledger::PositionLedger;
pub use state::{EngineState, EngineStatus, StatusSnapshot};
