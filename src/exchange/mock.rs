use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{OrderAck, OrderSide, TradingPair};

/// An order the mock accepted
#[derive(Debug, Clone, PartialEq)]
pub struct MockOrder {
    pub pair: TradingPair,
    pub side: OrderSide,
    pub quantity: f64,
}

#[derive(Default)]
struct MockBook {
    prices: HashMap<TradingPair, f64>,
    closes: HashMap<TradingPair, Vec<f64>>,
    balances: HashMap<String, f64>,
    failing_prices: HashSet<TradingPair>,
    failing_closes: HashSet<TradingPair>,
    fail_balances: bool,
    fail_orders: bool,
    orders: Vec<MockOrder>,
    events: Vec<String>,
    closes_requests: usize,
    next_order_id: u64,
}

/// Scriptable in-memory exchange
///
/// Prices, candle closes and balances are set by the caller; any call can be
/// made to fail. Filled orders credit/debit the base asset balance.
#[derive(Default)]
pub struct MockExchange {
    book: Mutex<MockBook>,
    order_latency: Option<Duration>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every order submission (used to widen race windows)
    pub fn with_order_latency(mut self, latency: Duration) -> Self {
        self.order_latency = Some(latency);
        self
    }

    fn book(&self) -> std::sync::MutexGuard<'_, MockBook> {
        // A panicking test thread must not poison every other assertion
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_price(&self, pair: &TradingPair, price: f64) {
        self.book().prices.insert(pair.clone(), price);
    }

    pub fn set_closes(&self, pair: &TradingPair, closes: Vec<f64>) {
        self.book().closes.insert(pair.clone(), closes);
    }

    pub fn set_balance(&self, asset: &str, amount: f64) {
        self.book().balances.insert(asset.to_uppercase(), amount);
    }

    pub fn fail_price(&self, pair: &TradingPair, fail: bool) {
        let mut book = self.book();
        if fail {
            book.failing_prices.insert(pair.clone());
        } else {
            book.failing_prices.remove(pair);
        }
    }

    pub fn fail_closes(&self, pair: &TradingPair, fail: bool) {
        let mut book = self.book();
        if fail {
            book.failing_closes.insert(pair.clone());
        } else {
            book.failing_closes.remove(pair);
        }
    }

    pub fn fail_balances(&self, fail: bool) {
        self.book().fail_balances = fail;
    }

    pub fn fail_orders(&self, fail: bool) {
        self.book().fail_orders = fail;
    }

    pub fn orders(&self) -> Vec<MockOrder> {
        self.book().orders.clone()
    }

    /// Chronological `begin:<SIDE>:<pair>` / `end:<SIDE>:<pair>` markers of order submissions
    pub fn events(&self) -> Vec<String> {
        self.book().events.clone()
    }

    pub fn closes_requests(&self) -> usize {
        self.book().closes_requests
    }

    pub fn balance(&self, asset: &str) -> f64 {
        self.book()
            .balances
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or(0.0)
    }

    async fn submit(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.book().events.push(format!("begin:{}:{}", side, pair));

        if let Some(latency) = self.order_latency {
            tokio::time::sleep(latency).await;
        }

        let mut book = self.book();
        book.events.push(format!("end:{}:{}", side, pair));

        if book.fail_orders {
            return Err(ExchangeError::Rejected(format!(
                "mock rejected {} {} {}",
                side, quantity, pair
            )));
        }

        let base = book.balances.entry(pair.base().to_string()).or_insert(0.0);
        match side {
            OrderSide::Buy => *base += quantity,
            OrderSide::Sell => *base = (*base - quantity).max(0.0),
        }

        book.next_order_id += 1;
        let order_id = format!("mock-{}", book.next_order_id);
        book.orders.push(MockOrder {
            pair: pair.clone(),
            side,
            quantity,
        });

        Ok(OrderAck {
            order_id,
            executed_quantity: quantity,
        })
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    async fn last_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        let book = self.book();
        if book.failing_prices.contains(pair) {
            return Err(ExchangeError::MissingData(format!("price for {}", pair)));
        }
        book.prices
            .get(pair)
            .copied()
            .ok_or_else(|| ExchangeError::MissingData(format!("price for {}", pair)))
    }

    async fn recent_closes(
        &self,
        pair: &TradingPair,
        _interval: &str,
        count: usize,
    ) -> Result<Vec<f64>, ExchangeError> {
        let mut book = self.book();
        book.closes_requests += 1;
        if book.failing_closes.contains(pair) {
            return Err(ExchangeError::MissingData(format!("candles for {}", pair)));
        }

        let closes = book.closes.get(pair).cloned().unwrap_or_default();
        let start = closes.len().saturating_sub(count);
        Ok(closes[start..].to_vec())
    }

    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        if self.book().fail_balances {
            return Err(ExchangeError::MissingData(format!("balance for {}", asset)));
        }
        Ok(self.balance(asset))
    }

    async fn market_buy(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.submit(pair, OrderSide::Buy, base_quantity).await
    }

    async fn market_sell(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.submit(pair, OrderSide::Sell, base_quantity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closes_return_latest_window() {
        let pair = TradingPair::new("BTC", "USDT");
        let exchange = MockExchange::new();
        exchange.set_closes(&pair, vec![1.0, 2.0, 3.0, 4.0]);

        let closes = exchange.recent_closes(&pair, "1m", 2).await.unwrap();
        assert_eq!(closes, vec![3.0, 4.0]);
        assert_eq!(exchange.closes_requests(), 1);
    }

    #[tokio::test]
    async fn test_fills_move_base_balance() {
        let pair = TradingPair::new("BTC", "USDT");
        let exchange = MockExchange::new();

        exchange.market_buy(&pair, 2.0).await.unwrap();
        assert_eq!(exchange.free_balance("BTC").await.unwrap(), 2.0);

        exchange.market_sell(&pair, 2.0).await.unwrap();
        assert_eq!(exchange.free_balance("BTC").await.unwrap(), 0.0);
        assert_eq!(exchange.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_injectable() {
        let pair = TradingPair::new("BTC", "USDT");
        let exchange = MockExchange::new();
        exchange.set_price(&pair, 10.0);
        exchange.fail_price(&pair, true);
        exchange.fail_orders(true);

        assert!(exchange.last_price(&pair).await.is_err());
        assert!(exchange.market_buy(&pair, 1.0).await.is_err());
        assert!(exchange.orders().is_empty());
    }
}
