use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::OrderError;
use crate::exchange::ExchangeGateway;
use crate::execution::EngineState;
use crate::models::{OrderReceipt, OrderSide, TradingPair};

/// Places market orders and keeps the position ledger in step with them.
///
/// Every execution, for every pair, runs inside one async critical section:
/// one order is in flight at a time, and the ledger update for an order
/// happens before the next order can fetch its price.
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    state: Arc<EngineState>,
    order_lock: Mutex<()>,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, state: Arc<EngineState>) -> Self {
        Self {
            gateway,
            state,
            order_lock: Mutex::new(()),
        }
    }

    /// Spend `quote_amount` of the quote asset on the pair at market.
    ///
    /// The position opens at the price fetched right before submission, and
    /// only if the exchange accepted the order.
    pub async fn execute_buy(
        &self,
        pair: &TradingPair,
        quote_amount: f64,
    ) -> Result<OrderReceipt, OrderError> {
        let _guard = self.order_lock.lock().await;

        let price = self.gateway.last_price(pair).await.map_err(|source| {
            tracing::warn!(pair = %pair, error = %source, "Buy skipped: price unavailable");
            OrderError::PriceUnavailable {
                pair: pair.to_string(),
                source,
            }
        })?;

        if !(price.is_finite() && price > 0.0) {
            tracing::warn!(pair = %pair, price = %price, "Buy skipped: invalid price");
            return Err(OrderError::InvalidPrice {
                pair: pair.to_string(),
                price,
            });
        }

        let quantity = quote_amount / price;
        let ack = self
            .gateway
            .market_buy(pair, quantity)
            .await
            .map_err(|source| {
                tracing::error!(pair = %pair, quantity = %quantity, error = %source, "❌ Buy order failed");
                OrderError::Exchange {
                    pair: pair.to_string(),
                    source,
                }
            })?;

        let timestamp = Utc::now();
        self.state
            .with_ledger_mut(|ledger| ledger.open(pair.clone(), price, timestamp));

        tracing::info!(
            pair = %pair,
            order_id = %ack.order_id,
            "💰 Bought {} {} at price {}",
            ack.executed_quantity,
            pair,
            price
        );

        Ok(OrderReceipt {
            order_id: ack.order_id,
            pair: pair.clone(),
            side: OrderSide::Buy,
            quantity: ack.executed_quantity,
            price: Some(price),
            timestamp,
        })
    }

    /// Sell `base_amount` of the pair's base asset at market and close the position.
    ///
    /// The price lookup is informational; a failed lookup does not block the sell.
    pub async fn execute_sell(
        &self,
        pair: &TradingPair,
        base_amount: f64,
    ) -> Result<OrderReceipt, OrderError> {
        let _guard = self.order_lock.lock().await;

        let price = match self.gateway.last_price(pair).await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Price unavailable, selling anyway");
                None
            }
        };

        let ack = self
            .gateway
            .market_sell(pair, base_amount)
            .await
            .map_err(|source| {
                tracing::error!(pair = %pair, quantity = %base_amount, error = %source, "❌ Sell order failed");
                OrderError::Exchange {
                    pair: pair.to_string(),
                    source,
                }
            })?;

        let timestamp = Utc::now();
        self.state.with_ledger_mut(|ledger| ledger.close(pair));

        tracing::info!(
            pair = %pair,
            order_id = %ack.order_id,
            "💸 Sold {} {} at price {}",
            ack.executed_quantity,
            pair,
            price.map_or_else(|| "unknown".to_string(), |p| p.to_string())
        );

        Ok(OrderReceipt {
            order_id: ack.order_id,
            pair: pair.clone(),
            side: OrderSide::Sell,
            quantity: ack.executed_quantity,
            price,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;
    use std::time::Duration;

    fn setup(exchange: MockExchange) -> (TradingPair, Arc<MockExchange>, Arc<EngineState>, Arc<OrderExecutor>) {
        let pair = TradingPair::new("BTC", "USDT");
        let exchange = Arc::new(exchange);
        let state = Arc::new(EngineState::new());
        let executor = Arc::new(OrderExecutor::new(exchange.clone(), state.clone()));
        (pair, exchange, state, executor)
    }

    #[tokio::test]
    async fn test_buy_opens_position_at_fetched_price() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());
        exchange.set_price(&pair, 50.0);

        let receipt = executor.execute_buy(&pair, 100.0).await.unwrap();

        assert_eq!(receipt.side, OrderSide::Buy);
        assert_eq!(receipt.quantity, 2.0);
        assert_eq!(receipt.price, Some(50.0));
        assert_eq!(state.position(&pair).unwrap().entry_price, 50.0);
        assert_eq!(exchange.orders()[0].quantity, 2.0);
    }

    #[tokio::test]
    async fn test_buy_without_price_leaves_ledger_untouched() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());

        let result = executor.execute_buy(&pair, 100.0).await;

        assert!(matches!(result, Err(OrderError::PriceUnavailable { .. })));
        assert!(state.position(&pair).is_none());
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_buy_rejects_non_positive_price() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());
        exchange.set_price(&pair, 0.0);

        let result = executor.execute_buy(&pair, 100.0).await;

        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
        assert!(state.position(&pair).is_none());
    }

    #[tokio::test]
    async fn test_rejected_buy_leaves_ledger_untouched() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());
        exchange.set_price(&pair, 50.0);
        exchange.fail_orders(true);

        let result = executor.execute_buy(&pair, 100.0).await;

        assert!(matches!(result, Err(OrderError::Exchange { .. })));
        assert!(state.position(&pair).is_none());
    }

    #[tokio::test]
    async fn test_sell_closes_position_even_without_price() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());
        exchange.set_price(&pair, 50.0);
        executor.execute_buy(&pair, 100.0).await.unwrap();
        exchange.fail_price(&pair, true);

        let receipt = executor.execute_sell(&pair, 2.0).await.unwrap();

        assert_eq!(receipt.side, OrderSide::Sell);
        assert_eq!(receipt.price, None);
        assert!(state.position(&pair).is_none());
        assert_eq!(exchange.balance("BTC"), 0.0);
    }

    #[tokio::test]
    async fn test_rejected_sell_keeps_position() {
        let (pair, exchange, state, executor) = setup(MockExchange::new());
        exchange.set_price(&pair, 50.0);
        executor.execute_buy(&pair, 100.0).await.unwrap();
        exchange.fail_orders(true);

        assert!(executor.execute_sell(&pair, 2.0).await.is_err());
        assert_eq!(state.position(&pair).unwrap().entry_price, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_orders_never_interleave() {
        let (pair, exchange, state, executor) =
            setup(MockExchange::new().with_order_latency(Duration::from_millis(50)));
        exchange.set_price(&pair, 10.0);

        let buy = {
            let executor = executor.clone();
            let pair = pair.clone();
            tokio::spawn(async move { executor.execute_buy(&pair, 100.0).await })
        };
        let sell = {
            let executor = executor.clone();
            let pair = pair.clone();
            tokio::spawn(async move { executor.execute_sell(&pair, 10.0).await })
        };

        let buy = buy.await.unwrap();
        let sell = sell.await.unwrap();
        assert!(buy.is_ok() && sell.is_ok());

        // Each submission finishes before the next one begins
        let events = exchange.events();
        assert_eq!(events.len(), 4);
        for window in events.chunks(2) {
            assert!(window[0].starts_with("begin:"));
            assert_eq!(window[0].replacen("begin:", "", 1), window[1].replacen("end:", "", 1));
        }

        // The ledger reflects whichever order completed last
        let last_side = &events[3];
        if last_side.contains("SELL") {
            assert!(state.position(&pair).is_none());
        } else {
            assert_eq!(state.position(&pair).unwrap().entry_price, 10.0);
        }
    }
}
