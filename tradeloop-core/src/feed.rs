//! Candle delivery for backtests.
//!
//! A feed yields one batch of candles per tick, keyed by pair. Pairs may
//! skip ticks (exchange downtime, thin markets); the scheduler only acts
//! on the pairs present in a batch.

use crate::domain::Candle;
use std::collections::BTreeMap;

pub trait CandleFeed {
    /// Next batch of candles, or `None` when the feed is exhausted.
    fn next_candles(&mut self) -> Option<BTreeMap<String, Candle>>;

    /// Rewind to the first tick.
    fn reset(&mut self);

    fn pairs(&self) -> Vec<String>;
}

/// Feed backed by pre-loaded per-pair candle vectors, aligned by open
/// time. Each call yields every candle sharing the earliest unconsumed
/// open time, so pairs with gaps simply drop out of that batch.
pub struct VecFeed {
    series: BTreeMap<String, Vec<Candle>>,
    cursors: BTreeMap<String, usize>,
}

impl VecFeed {
    pub fn new(series: BTreeMap<String, Vec<Candle>>) -> Self {
        let cursors = series.keys().map(|p| (p.clone(), 0)).collect();
        Self { series, cursors }
    }

    /// Single-pair convenience constructor.
    pub fn single(pair: &str, candles: Vec<Candle>) -> Self {
        let mut series = BTreeMap::new();
        series.insert(pair.to_string(), candles);
        Self::new(series)
    }
}

impl CandleFeed for VecFeed {
    fn next_candles(&mut self) -> Option<BTreeMap<String, Candle>> {
        let next_time = self
            .series
            .iter()
            .filter_map(|(pair, candles)| candles.get(self.cursors[pair]).map(|c| c.open_time))
            .min()?;

        let mut batch = BTreeMap::new();
        for (pair, cursor) in self.cursors.iter_mut() {
            let Some(candle) = self.series.get(pair).and_then(|c| c.get(*cursor)) else {
                continue;
            };
            if candle.open_time == next_time {
                batch.insert(pair.clone(), candle.clone());
                *cursor += 1;
            }
        }
        Some(batch)
    }

    fn reset(&mut self) {
        for cursor in self.cursors.values_mut() {
            *cursor = 0;
        }
    }

    fn pairs(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }
}
