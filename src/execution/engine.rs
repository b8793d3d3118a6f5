use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ConfigError;
use crate::exchange::ExchangeGateway;
use crate::execution::{EngineState, OrderExecutor};
use crate::models::TradingPair;
use crate::strategy::{BaselineTracker, SignalConfig};

/// Static parameters of the trading loop
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pairs: Vec<TradingPair>,
    pub total_investment: f64,
    pub signals: SignalConfig,
    pub cycle_interval: Duration,
}

impl EngineSettings {
    /// Quote amount spent per buy: the investment split evenly across all
    /// configured pairs, regardless of which pairs end up trading
    pub fn allocation_per_pair(&self) -> f64 {
        self.total_investment / self.pairs.len() as f64
    }
}

/// The decision loop: compares each pair's price against its baseline and
/// open position, and routes buys and sells through the order executor.
pub struct TradingEngine {
    settings: EngineSettings,
    gateway: Arc<dyn ExchangeGateway>,
    state: Arc<EngineState>,
    baselines: BaselineTracker,
    executor: OrderExecutor,
}

impl TradingEngine {
    pub fn new(
        settings: EngineSettings,
        gateway: Arc<dyn ExchangeGateway>,
        baselines: BaselineTracker,
        state: Arc<EngineState>,
    ) -> Result<Self, ConfigError> {
        if settings.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }

        let executor = OrderExecutor::new(gateway.clone(), state.clone());
        Ok(Self {
            settings,
            gateway,
            state,
            baselines,
            executor,
        })
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// Compute a fresh baseline for every pair. Pairs whose candles cannot be
    /// fetched are left without one.
    pub async fn initialize_baselines(&self) {
        for pair in &self.settings.pairs {
            let baseline = self.baselines.compute(pair).await;
            self.state.set_baseline(pair, baseline);
        }

        tracing::info!("📊 Initial baseline prices: {:?}", self.state.baselines());
    }

    /// Run until stopped. Stop requests are honoured between cycles; a cycle
    /// that has started always finishes. The end-of-cycle sleep is cut short
    /// by a stop request.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        tracing::info!(pairs = self.settings.pairs.len(), "🚀 Trading loop starting");

        self.initialize_baselines().await;
        let allocation = self.settings.allocation_per_pair();
        tracing::info!("  Allocation per pair: {:.4}", allocation);

        loop {
            if !self.state.is_running() || *stop.borrow() {
                break;
            }

            self.run_cycle(allocation).await;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Stop channel closed, leaving trading loop");
                        break;
                    }
                }
            }
        }

        self.state.mark_idle();
        tracing::info!("👋 Trading loop stopped");
    }

    /// One pass over every configured pair, in configured order
    pub async fn run_cycle(&self, allocation: f64) {
        tracing::debug!("💹 Trading cycle starting");
        for pair in &self.settings.pairs {
            self.process_pair(pair, allocation).await;
        }
    }

    async fn process_pair(&self, pair: &TradingPair, allocation: f64) {
        let current_price = match self.gateway.last_price(pair).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Price unavailable, skipping pair this cycle");
                return;
            }
        };

        // A pair whose baseline could not be computed gets another try before
        // any buy decision is made
        let baseline = match self.state.baseline(pair) {
            Some(baseline) => Some(baseline),
            None => {
                let baseline = self.baselines.compute(pair).await;
                self.state.set_baseline(pair, baseline);
                baseline
            }
        };

        if let Some(baseline) = baseline {
            self.evaluate_buy(pair, current_price, baseline, allocation).await;
        }

        self.evaluate_sell(pair, current_price).await;
    }

    async fn evaluate_buy(&self, pair: &TradingPair, current_price: f64, baseline: f64, allocation: f64) {
        let signals = &self.settings.signals;
        if !signals.buy_triggered(current_price, baseline) {
            return;
        }

        if !self.state.is_running() {
            tracing::info!(pair = %pair, "Buy condition met but engine is stopping, not buying");
            return;
        }

        tracing::info!(
            pair = %pair,
            price = %current_price,
            target = %signals.target_buy_price(baseline),
            "📉 {} price dropped below {}% of the average price. Buying...",
            pair,
            signals.threshold_percent
        );

        if let Err(e) = self.executor.execute_buy(pair, allocation).await {
            tracing::warn!(pair = %pair, error = %e, "Buy attempt failed");
        }

        // Refreshed after every attempt, successful or not
        let refreshed = self.baselines.compute(pair).await;
        self.state.set_baseline(pair, refreshed);
    }

    async fn evaluate_sell(&self, pair: &TradingPair, current_price: f64) {
        let Some(position) = self.state.position(pair) else {
            return;
        };

        let balance = match self.gateway.free_balance(pair.base()).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Balance unavailable, skipping sell check");
                return;
            }
        };

        let signals = &self.settings.signals;
        if !signals.sell_triggered(current_price, position.entry_price, balance) {
            return;
        }

        tracing::info!(
            pair = %pair,
            price = %current_price,
            target = %signals.target_sell_price(position.entry_price),
            "📈 {} price reached target sell price. Selling...",
            pair
        );

        if let Err(e) = self.executor.execute_sell(pair, balance).await {
            tracing::warn!(pair = %pair, error = %e, "Sell attempt failed");
        }
    }
}
