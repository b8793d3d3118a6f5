use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::models::{Position, TradingPair};

/// Open positions, at most one per pair
///
/// Pure bookkeeping: no I/O, no validation against the exchange.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<TradingPair, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &TradingPair) -> Option<&Position> {
        self.positions.get(pair)
    }

    /// Record a position, replacing any existing one for the pair.
    ///
    /// Re-buying while a position is open does not average in; the new entry
    /// price simply wins. Returns the replaced position, if any.
    pub fn open(
        &mut self,
        pair: TradingPair,
        entry_price: f64,
        opened_at: DateTime<Utc>,
    ) -> Option<Position> {
        let replaced = self.positions.insert(
            pair.clone(),
            Position {
                entry_price,
                opened_at,
            },
        );

        if let Some(previous) = &replaced {
            tracing::warn!(
                pair = %pair,
                previous_entry = %previous.entry_price,
                new_entry = %entry_price,
                "Replaced open position entry price"
            );
        }

        replaced
    }

    /// Drop the pair's position. Closing a pair with no position is a no-op.
    pub fn close(&mut self, pair: &TradingPair) -> Option<Position> {
        self.positions.remove(pair)
    }

    /// Entry price per pair, keyed by `BASE/QUOTE`
    pub fn entry_prices(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(pair, position)| (pair.to_string(), position.entry_price))
            .collect()
    }
}
