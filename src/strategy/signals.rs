/// Thresholds for the dip-buy / take-profit rules
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    /// Drop below baseline, in percent, that triggers a buy (5.0 = 5%)
    pub threshold_percent: f64,
    /// Multiplier over entry price that triggers a sell (1.05 = +5%)
    pub sell_profit_margin: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 5.0,
            sell_profit_margin: 1.05,
        }
    }
}

impl SignalConfig {
    /// Price at or below which a buy triggers
    pub fn target_buy_price(&self, baseline: f64) -> f64 {
        baseline * (1.0 - self.threshold_percent / 100.0)
    }

    /// Price at or above which an open position is sold
    pub fn target_sell_price(&self, entry_price: f64) -> f64 {
        entry_price * self.sell_profit_margin
    }

    pub fn buy_triggered(&self, current_price: f64, baseline: f64) -> bool {
        current_price <= self.target_buy_price(baseline)
    }

    /// Sells also need something to sell: a strictly positive free balance
    pub fn sell_triggered(&self, current_price: f64, entry_price: f64, balance: f64) -> bool {
        current_price >= self.target_sell_price(entry_price) && balance > 0.0
    }
}
