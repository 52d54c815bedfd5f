//! Bollinger-squeeze arming rules.
//!
//! Arms when the bands have squeezed tight (bandwidth at or under the
//! width threshold) and the latest bar's high breaks the upper band —
//! low volatility resolving upward. Resets when the close falls to or
//! below the lower band. The two predicates are independent; the
//! accumulator gives reset precedence when both fire on one bar.

use serde::{Deserialize, Serialize};
use tradeloop_core::domain::Candle;
use tradeloop_core::pattern::ArmingRules;

use crate::indicators::Bollinger;

/// Default band period.
pub const DEFAULT_PERIOD: usize = 20;
/// Default stddev multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default squeeze threshold on `(upper - lower) / middle`.
pub const DEFAULT_WIDTH_THRESHOLD: f64 = 0.055;

/// Tunable parameters, loadable alongside the engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqueezeConfig {
    pub period: usize,
    pub multiplier: f64,
    pub width_threshold: f64,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            multiplier: DEFAULT_MULTIPLIER,
            width_threshold: DEFAULT_WIDTH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BollingerSqueezeRules {
    bands: Bollinger,
    width_threshold: f64,
}

impl BollingerSqueezeRules {
    pub fn new(period: usize, multiplier: f64, width_threshold: f64) -> Self {
        Self { bands: Bollinger::new(period, multiplier), width_threshold }
    }

    pub fn from_config(config: &SqueezeConfig) -> Self {
        Self::new(config.period, config.multiplier, config.width_threshold)
    }
}

impl Default for BollingerSqueezeRules {
    fn default() -> Self {
        Self::from_config(&SqueezeConfig::default())
    }
}

impl ArmingRules for BollingerSqueezeRules {
    fn arm(&self, history: &[Candle]) -> bool {
        let (Some(latest), Some(bands)) = (history.last(), self.bands.latest(history)) else {
            return false;
        };
        let width = bands.bandwidth();
        width.is_finite() && width <= self.width_threshold && latest.high > bands.upper
    }

    fn reset(&self, history: &[Candle]) -> bool {
        let (Some(latest), Some(bands)) = (history.last(), self.bands.latest(history)) else {
            return false;
        };
        latest.close <= bands.lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;
    use tradeloop_core::pattern::PatternAccumulator;

    #[test]
    fn squeeze_breakout_arms() {
        // Flat stretch squeezes the bands; the final bar's high clears
        // the upper band (make_candles pads high by 1.0).
        let candles = make_candles(&[100.0, 100.0, 100.0, 100.5]);
        let rules = BollingerSqueezeRules::new(3, 2.0, 0.055);
        assert!(rules.arm(&candles));
        assert!(!rules.reset(&candles));
    }

    #[test]
    fn wide_bands_do_not_arm() {
        let candles = make_candles(&[100.0, 90.0, 110.0, 100.0]);
        let rules = BollingerSqueezeRules::new(3, 2.0, 0.055);
        assert!(!rules.arm(&candles));
    }

    #[test]
    fn squeeze_without_breakout_does_not_arm() {
        let mut candles = make_candles(&[100.0, 100.0, 100.0, 100.0]);
        if let Some(last) = candles.last_mut() {
            last.high = 100.0;
        }
        let rules = BollingerSqueezeRules::new(3, 2.0, 0.055);
        assert!(!rules.arm(&candles));
    }

    #[test]
    fn close_at_or_below_lower_band_resets() {
        // mult 0.5 keeps the lower band above the crash close:
        // closes (100, 100, 98) -> mean 99.33, lower ~98.86.
        let candles = make_candles(&[100.0, 100.0, 98.0]);
        let rules = BollingerSqueezeRules::new(3, 0.5, 0.055);
        assert!(rules.reset(&candles));

        let candles = make_candles(&[100.0, 100.0, 101.0]);
        assert!(!rules.reset(&candles));
    }

    #[test]
    fn insufficient_history_neither_arms_nor_resets() {
        let candles = make_candles(&[100.0]);
        let rules = BollingerSqueezeRules::new(3, 2.0, 0.055);
        assert!(!rules.arm(&candles));
        assert!(!rules.reset(&candles));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: SqueezeConfig = serde_json::from_str(r#"{"period": 10}"#).unwrap();
        assert_eq!(config.period, 10);
        assert_eq!(config.multiplier, DEFAULT_MULTIPLIER);
        assert_eq!(config.width_threshold, DEFAULT_WIDTH_THRESHOLD);
        assert!(serde_json::from_str::<SqueezeConfig>(r#"{"perod": 10}"#).is_err());
    }

    #[test]
    fn accumulator_arms_on_the_breakout_bar() {
        let rules = BollingerSqueezeRules::new(3, 2.0, 0.055);
        let mut acc = PatternAccumulator::new(Box::new(rules));
        for candle in make_candles(&[100.0, 100.0, 100.0, 100.5]) {
            acc.update("TEST/USDT", &candle);
        }
        let state = acc.state("TEST/USDT").unwrap();
        assert!(state.armed);
    }
}
