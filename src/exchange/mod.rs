// Exchange connectivity: the gateway trait and its implementations
pub mod binance;
pub mod mock;
pub mod paper;

pub use binance::BinanceClient;
pub use mock::MockExchange;
pub use paper::PaperExchange;

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::models::{OrderAck, TradingPair};

/// Candle intervals accepted by `recent_closes`
pub const CANDLE_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Everything the trading engine needs from an exchange.
///
/// Implementations are pure I/O: no decisions, no retries beyond transport
/// concerns, no ledger state.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last traded price for the pair
    async fn last_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;

    /// Close prices of the most recent `count` candles, oldest first
    async fn recent_closes(
        &self,
        pair: &TradingPair,
        interval: &str,
        count: usize,
    ) -> Result<Vec<f64>, ExchangeError>;

    /// Free (unlocked) balance of a single asset; zero when the account holds none
    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError>;

    /// Market buy of `base_quantity` units of the pair's base asset
    async fn market_buy(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError>;

    /// Market sell of `base_quantity` units of the pair's base asset
    async fn market_sell(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError>;
}
