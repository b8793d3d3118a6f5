use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{OrderAck, OrderSide, TradingPair};

/// Rounding slack when a buy spends the whole quote balance
const DUST: f64 = 1e-9;

/// Paper-trading gateway
///
/// Market data comes from a real gateway; fills happen in memory at the last
/// price, against a simulated wallet.
pub struct PaperExchange {
    market_data: Arc<dyn ExchangeGateway>,
    balances: Mutex<HashMap<String, f64>>,
}

impl PaperExchange {
    pub fn new(market_data: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            market_data,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the simulated wallet
    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.lock_balances().insert(asset.to_uppercase(), amount);
        self
    }

    fn lock_balances(&self) -> std::sync::MutexGuard<'_, HashMap<String, f64>> {
        self.balances.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn fill(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(ExchangeError::Rejected(format!("invalid quantity {}", quantity)));
        }

        let price = self.market_data.last_price(pair).await?;
        let notional = quantity * price;

        let mut balances = self.lock_balances();
        let base_held = balances.get(pair.base()).copied().unwrap_or(0.0);
        let quote_held = balances.get(pair.quote()).copied().unwrap_or(0.0);

        let (base_after, quote_after) = match side {
            OrderSide::Buy if notional - quote_held > DUST => {
                return Err(ExchangeError::Rejected(format!(
                    "insufficient {}: need {:.8}, have {:.8}",
                    pair.quote(),
                    notional,
                    quote_held
                )));
            }
            OrderSide::Sell if quantity - base_held > DUST => {
                return Err(ExchangeError::Rejected(format!(
                    "insufficient {}: need {:.8}, have {:.8}",
                    pair.base(),
                    quantity,
                    base_held
                )));
            }
            OrderSide::Buy => (base_held + quantity, (quote_held - notional).max(0.0)),
            OrderSide::Sell => ((base_held - quantity).max(0.0), quote_held + notional),
        };

        balances.insert(pair.base().to_string(), base_after);
        balances.insert(pair.quote().to_string(), quote_after);

        tracing::info!(
            pair = %pair,
            side = %side,
            quantity = %quantity,
            price = %price,
            "📝 Paper fill"
        );

        Ok(OrderAck {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            executed_quantity: quantity,
        })
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    async fn last_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        self.market_data.last_price(pair).await
    }

    async fn recent_closes(
        &self,
        pair: &TradingPair,
        interval: &str,
        count: usize,
    ) -> Result<Vec<f64>, ExchangeError> {
        self.market_data.recent_closes(pair, interval, count).await
    }

    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        Ok(self
            .lock_balances()
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or(0.0))
    }

    async fn market_buy(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.fill(pair, OrderSide::Buy, base_quantity).await
    }

    async fn market_sell(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.fill(pair, OrderSide::Sell, base_quantity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;

    fn setup(price: f64) -> (TradingPair, PaperExchange) {
        let pair = TradingPair::new("SOL", "USDT");
        let market = MockExchange::new();
        market.set_price(&pair, price);
        let paper = PaperExchange::new(Arc::new(market)).with_balance("USDT", 100.0);
        (pair, paper)
    }

    #[tokio::test]
    async fn test_buy_then_sell_moves_wallet() {
        let (pair, paper) = setup(20.0);

        paper.market_buy(&pair, 2.5).await.unwrap();
        assert_eq!(paper.free_balance("SOL").await.unwrap(), 2.5);
        assert_eq!(paper.free_balance("USDT").await.unwrap(), 50.0);

        paper.market_sell(&pair, 2.5).await.unwrap();
        assert_eq!(paper.free_balance("SOL").await.unwrap(), 0.0);
        assert_eq!(paper.free_balance("USDT").await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_buy_rejected_without_quote_funds() {
        let (pair, paper) = setup(20.0);

        let result = paper.market_buy(&pair, 10.0).await;
        assert!(matches!(result, Err(ExchangeError::Rejected(_))));
        assert_eq!(paper.free_balance("USDT").await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_buy_can_spend_whole_quote_balance() {
        let (pair, paper) = setup(94.9);

        paper.market_buy(&pair, 100.0 / 94.9).await.unwrap();
        assert!(paper.free_balance("USDT").await.unwrap() < 1e-9);
    }

    #[tokio::test]
    async fn test_sell_rejected_without_base_funds() {
        let (pair, paper) = setup(20.0);

        let result = paper.market_sell(&pair, 1.0).await;
        assert!(matches!(result, Err(ExchangeError::Rejected(_))));
    }
}
