//! Stoploss ratchet.
//!
//! Core rule: once set by a strategy proposal, the stop price may only move
//! in the profitable direction (up for longs, down for shorts). Two
//! carve-outs:
//! - the configured floor is an initialization default, so the first
//!   hook-supplied ratio replaces it in either direction;
//! - a post-fill refresh may move the stop either way once, immediately
//!   after an order fill (repricing after an averaging adjustment).

use crate::domain::Direction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a stop proposal is allowed to move the stored stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAdjust {
    /// Set only if no stop price exists yet (trade open / first fill).
    Initial,
    /// Normal per-tick strategy proposal: ratchet applies, except that the
    /// first proposal replaces the floor default.
    Ratchet,
    /// Config-driven trailing proposal: strict ratchet, no floor exception.
    Trailing,
    /// Post-fill refresh: may move in either direction.
    PostFill,
}

/// Per-trade stoploss state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoplossState {
    /// Current stop distance as a negative ratio of the reference price.
    pub stop_ratio: f64,
    /// Absolute stop price, set once a reference price is known.
    pub stop_price: Option<f64>,
    /// The configured floor this state was initialized from.
    pub initial_stop_ratio: f64,
    /// Best price observed since open (highest for longs, lowest for shorts).
    pub high_water_mark: Option<f64>,
    /// Whether a strategy proposal has replaced the floor yet.
    hook_initialized: bool,
    /// Whether the stop has moved off the floor-derived level
    /// (selects the trailing-stop exit reason on breach).
    trailed: bool,
}

impl StoplossState {
    /// `floor` is the configured static stoploss, a negative ratio.
    pub fn new(floor: f64) -> Self {
        Self {
            stop_ratio: floor,
            stop_price: None,
            initial_stop_ratio: floor,
            high_water_mark: None,
            hook_initialized: false,
            trailed: false,
        }
    }

    pub fn is_trailed(&self) -> bool {
        self.trailed
    }

    /// Track the best price seen so far.
    pub fn observe(&mut self, direction: Direction, rate: f64) {
        self.high_water_mark = Some(match (self.high_water_mark, direction) {
            (None, _) => rate,
            (Some(hwm), Direction::Long) => hwm.max(rate),
            (Some(hwm), Direction::Short) => hwm.min(rate),
        });
    }

    fn candidate_price(direction: Direction, rate: f64, ratio: f64) -> f64 {
        match direction {
            Direction::Long => rate * (1.0 - ratio.abs()),
            Direction::Short => rate * (1.0 + ratio.abs()),
        }
    }

    /// Apply a stop proposal. `ratio`'s absolute value is the distance from
    /// `rate`. Non-finite ratios are discarded. Returns true if the stored
    /// stop changed.
    ///
    /// Proposals from the strategy hook (`Ratchet` mode) replace the
    /// floor-derived stop unconditionally the first time, then only tighten.
    pub fn adjust(&mut self, direction: Direction, rate: f64, ratio: f64, mode: StopAdjust) -> bool {
        if !ratio.is_finite() || rate <= 0.0 {
            warn!(ratio, rate, "discarding non-finite stoploss proposal");
            return false;
        }
        let candidate = Self::candidate_price(direction, rate, ratio);

        let apply = match (mode, self.stop_price) {
            (StopAdjust::Initial, None) => true,
            (StopAdjust::Initial, Some(_)) => false,
            (StopAdjust::PostFill, _) => true,
            (StopAdjust::Ratchet | StopAdjust::Trailing, None) => true,
            (StopAdjust::Ratchet, Some(_)) if !self.hook_initialized => {
                // First strategy proposal replaces the floor default.
                true
            }
            (StopAdjust::Ratchet | StopAdjust::Trailing, Some(current)) => match direction {
                Direction::Long => candidate > current,
                Direction::Short => candidate < current,
            },
        };

        if mode == StopAdjust::Ratchet {
            self.hook_initialized = true;
        }
        if !apply {
            debug!(candidate, current = ?self.stop_price, "stoploss proposal rejected by ratchet");
            return false;
        }

        self.stop_price = Some(candidate);
        self.stop_ratio = -ratio.abs();
        if mode != StopAdjust::Initial {
            self.trailed = true;
        }
        true
    }

    /// Whether this tick's candle crossed the stop price.
    pub fn is_breached(&self, direction: Direction, low: f64, high: f64) -> bool {
        match (self.stop_price, direction) {
            (Some(stop), Direction::Long) => low <= stop,
            (Some(stop), Direction::Short) => high >= stop,
            (None, _) => false,
        }
    }
}
