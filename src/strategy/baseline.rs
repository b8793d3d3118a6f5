use std::sync::Arc;

use crate::exchange::ExchangeGateway;
use crate::indicators::{calculate_mean, calculate_sma};
use crate::models::TradingPair;

/// Derives a pair's baseline: the mean of its most recent candle closes
#[derive(Clone)]
pub struct BaselineTracker {
    gateway: Arc<dyn ExchangeGateway>,
    interval: String,
    periods: usize,
}

impl BaselineTracker {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, interval: impl Into<String>, periods: usize) -> Self {
        Self {
            gateway,
            interval: interval.into(),
            periods,
        }
    }

    /// Mean of the last `periods` closes, or None when the exchange returned
    /// nothing or failed. Never an error: callers skip the pair instead.
    pub async fn compute(&self, pair: &TradingPair) -> Option<f64> {
        let closes = match self
            .gateway
            .recent_closes(pair, &self.interval, self.periods)
            .await
        {
            Ok(closes) => closes,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Baseline unavailable: candle fetch failed");
                return None;
            }
        };

        // Some venues return more than asked for; only the newest window counts
        let baseline = if closes.len() > self.periods {
            calculate_sma(&closes, self.periods)
        } else {
            calculate_mean(&closes)
        };

        match baseline {
            Some(value) => {
                tracing::debug!(pair = %pair, baseline = %value, samples = closes.len(), "Computed baseline");
                Some(value)
            }
            None => {
                tracing::warn!(pair = %pair, "Baseline unavailable: no candles returned");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;

    fn setup() -> (TradingPair, Arc<MockExchange>, BaselineTracker) {
        let pair = TradingPair::new("BTC", "USDT");
        let exchange = Arc::new(MockExchange::new());
        let tracker = BaselineTracker::new(exchange.clone(), "1m", 3);
        (pair, exchange, tracker)
    }

    #[tokio::test]
    async fn test_baseline_is_mean_of_latest_closes() {
        let (pair, exchange, tracker) = setup();
        exchange.set_closes(&pair, vec![50.0, 90.0, 100.0, 110.0]);

        assert_eq!(tracker.compute(&pair).await, Some(100.0));
    }

    #[tokio::test]
    async fn test_baseline_uses_fewer_samples_when_history_is_short() {
        let (pair, exchange, tracker) = setup();
        exchange.set_closes(&pair, vec![90.0, 110.0]);

        assert_eq!(tracker.compute(&pair).await, Some(100.0));
    }

    #[tokio::test]
    async fn test_baseline_unavailable_without_samples() {
        let (pair, _exchange, tracker) = setup();

        assert_eq!(tracker.compute(&pair).await, None);
    }

    #[tokio::test]
    async fn test_baseline_unavailable_on_gateway_error() {
        let (pair, exchange, tracker) = setup();
        exchange.set_closes(&pair, vec![100.0]);
        exchange.fail_closes(&pair, true);

        assert_eq!(tracker.compute(&pair).await, None);
    }
}
