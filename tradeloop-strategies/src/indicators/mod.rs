//! Indicator material used by the bundled arming rules.
//!
//! Indicators here are windowed computations over a pair's candle
//! history as the engine hands it to [`ArmingRules`]: the slice always
//! ends with the bar under evaluation, so each indicator exposes a
//! `latest` view rather than a full series.
//!
//! [`ArmingRules`]: tradeloop_core::pattern::ArmingRules

pub mod bollinger;

pub use bollinger::{Bollinger, BollingerBands};

/// Create synthetic candles from close prices for testing.
///
/// Generates plausible OHLV: open = prev close (or close for the first
/// bar), high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<tradeloop_core::domain::Candle> {
    use chrono::{Duration, TimeZone, Utc};
    use tradeloop_core::domain::Candle;
    let base_time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                pair: "TEST/USDT".to_string(),
                open_time: base_time + Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
