//! Candle — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for a single pair at one bar interval.
///
/// Candles arrive ordered by `open_time` with no duplicates; gaps are
/// possible (a pair may miss a bar) and downstream logic tolerates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub pair: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Basic OHLC sanity check: high is the top of the range, low the bottom,
    /// and prices are positive. NaN anywhere fails the check.
    pub fn is_sane(&self) -> bool {
        if self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}
