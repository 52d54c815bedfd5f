//! Bollinger Bands — moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + mult * stddev(close, period)
//! - Lower: middle - mult * stddev(close, period)
//!
//! Uses population stddev (divide by N). `latest` evaluates the bands
//! at the final bar of the history; fewer than `period` bars yields
//! `None`.

use tradeloop_core::domain::Candle;

/// The three bands evaluated at a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Band width relative to the middle band: `(upper - lower) / middle`.
    pub fn bandwidth(&self) -> f64 {
        if self.middle == 0.0 {
            return f64::NAN;
        }
        (self.upper - self.lower) / self.middle
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self { period, multiplier }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Bands over the trailing `period` closes of `history`.
    pub fn latest(&self, history: &[Candle]) -> Option<BollingerBands> {
        if history.len() < self.period {
            return None;
        }
        let window = &history[history.len() - self.period..];

        let mut sum = 0.0;
        for candle in window {
            if candle.close.is_nan() {
                return None;
            }
            sum += candle.close;
        }
        let mean = sum / self.period as f64;

        // Population stddev
        let variance: f64 = window
            .iter()
            .map(|candle| {
                let diff = candle.close - mean;
                diff * diff
            })
            .sum::<f64>()
            / self.period as f64;
        let stddev = variance.sqrt();

        Some(BollingerBands {
            upper: mean + self.multiplier * stddev,
            middle: mean,
            lower: mean - self.multiplier * stddev,
        })
    }
}
