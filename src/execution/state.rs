use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ControlError;
use crate::execution::PositionLedger;
use crate::models::{Position, TradingPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    Running,
    Stopping,
}

/// Consistent view of the bot for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub bot_active: bool,
    pub bought_prices: BTreeMap<String, f64>,
}

#[derive(Debug)]
struct StateInner {
    status: EngineStatus,
    baselines: HashMap<TradingPair, f64>,
    ledger: PositionLedger,
}

/// Process-wide engine state shared by the trading loop and the control surface.
///
/// One mutex guards status, baselines and positions together so multi-field
/// reads never mix old and new values. Nothing here is persisted.
#[derive(Debug)]
pub struct EngineState {
    inner: Mutex<StateInner>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                status: EngineStatus::Idle,
                baselines: HashMap::new(),
                ledger: PositionLedger::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> EngineStatus {
        self.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == EngineStatus::Running
    }

    /// Idle -> Running
    pub(crate) fn begin_run(&self) -> Result<(), ControlError> {
        let mut inner = self.lock();
        match inner.status {
            EngineStatus::Idle => {
                inner.status = EngineStatus::Running;
                Ok(())
            }
            EngineStatus::Running | EngineStatus::Stopping => Err(ControlError::AlreadyRunning),
        }
    }

    /// Running -> Stopping
    pub(crate) fn begin_stop(&self) -> Result<(), ControlError> {
        let mut inner = self.lock();
        match inner.status {
            EngineStatus::Running => {
                inner.status = EngineStatus::Stopping;
                Ok(())
            }
            EngineStatus::Idle | EngineStatus::Stopping => Err(ControlError::NotRunning),
        }
    }

    pub(crate) fn mark_idle(&self) {
        self.lock().status = EngineStatus::Idle;
    }

    pub fn baseline(&self, pair: &TradingPair) -> Option<f64> {
        self.lock().baselines.get(pair).copied()
    }

    /// Overwrite a pair's baseline; None records it as unavailable
    pub(crate) fn set_baseline(&self, pair: &TradingPair, baseline: Option<f64>) {
        let mut inner = self.lock();
        match baseline {
            Some(value) => {
                inner.baselines.insert(pair.clone(), value);
            }
            None => {
                inner.baselines.remove(pair);
            }
        }
    }

    pub fn baselines(&self) -> BTreeMap<String, f64> {
        self.lock()
            .baselines
            .iter()
            .map(|(pair, value)| (pair.to_string(), *value))
            .collect()
    }

    pub fn position(&self, pair: &TradingPair) -> Option<Position> {
        self.lock().ledger.get(pair).cloned()
    }

    /// Ledger writes go through here; only the order executor calls it
    pub(crate) fn with_ledger_mut<R>(&self, f: impl FnOnce(&mut PositionLedger) -> R) -> R {
        f(&mut self.lock().ledger)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            bot_active: inner.status == EngineStatus::Running,
            bought_prices: inner.ledger.entry_prices(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_lifecycle_transitions() {
        let state = EngineState::new();
        assert_eq!(state.status(), EngineStatus::Idle);

        state.begin_run().unwrap();
        assert!(state.is_running());
        assert_eq!(state.begin_run(), Err(ControlError::AlreadyRunning));

        state.begin_stop().unwrap();
        assert_eq!(state.status(), EngineStatus::Stopping);
        assert_eq!(state.begin_stop(), Err(ControlError::NotRunning));
        assert_eq!(state.begin_run(), Err(ControlError::AlreadyRunning));

        state.mark_idle();
        assert_eq!(state.begin_stop(), Err(ControlError::NotRunning));
        state.begin_run().unwrap();
    }

    #[test]
    fn test_unavailable_baseline_clears_previous_value() {
        let state = EngineState::new();
        let pair = TradingPair::new("ETH", "USDT");

        state.set_baseline(&pair, Some(3000.0));
        assert_eq!(state.baseline(&pair), Some(3000.0));

        state.set_baseline(&pair, None);
        assert_eq!(state.baseline(&pair), None);
    }

    #[test]
    fn test_snapshot_reports_status_and_positions() {
        let state = EngineState::new();
        let pair = TradingPair::new("ETH", "USDT");
        state.with_ledger_mut(|ledger| ledger.open(pair.clone(), 2500.0, Utc::now()));

        let idle = state.snapshot();
        assert!(!idle.bot_active);
        assert_eq!(idle.bought_prices.get("ETH/USDT"), Some(&2500.0));

        state.begin_run().unwrap();
        assert!(state.snapshot().bot_active);

        state.begin_stop().unwrap();
        assert!(!state.snapshot().bot_active);
    }

    #[test]
    fn test_snapshot_serializes_like_status_endpoint() {
        let state = EngineState::new();
        let json = serde_json::to_value(state.snapshot()).unwrap();

        assert_eq!(json["bot_active"], false);
        assert!(json["bought_prices"].as_object().unwrap().is_empty());
    }
}
