//! Pattern accumulator — per-pair armed state and accumulation window.
//!
//! Per closed bar the accumulator evaluates an implementation-supplied
//! arming predicate and an independent reset predicate. Arming opens an
//! accumulation window; while armed, every bar runs the structure-merge
//! rule over the window and scans for the three-phase motif. Reset
//! discards the window entirely. When both predicates fire on the same
//! bar, reset wins (fail safe toward no new entries).

pub mod structure;

pub use structure::{PendingLine, StructureKind, StructureLine};

use crate::domain::{Candle, Direction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use structure::{classify, detect_motif};
use tracing::{debug, info};

/// Bars of per-pair history retained for predicate lookback.
const MAX_HISTORY: usize = 512;

/// Arming and reset predicates over the pair's candle history.
///
/// The two predicates are evaluated independently and need not be
/// complements. `history` always ends with the bar being evaluated.
pub trait ArmingRules: Send + Sync {
    fn arm(&self, history: &[Candle]) -> bool;
    fn reset(&self, history: &[Candle]) -> bool;
}

/// Per-pair signal state.
///
/// Invariants: `!armed` implies an empty window; `armed` implies the
/// window spans every bar since `armed_since_index` with no gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalState {
    pub armed: bool,
    pub armed_since_index: Option<usize>,
    pub window: Vec<Candle>,
    pub structures: Vec<StructureLine>,
    pub last_structure: Option<StructureLine>,
    /// One-shot: true only on the tick the motif was detected.
    pub motif_detected: bool,
    pub motif_direction: Option<Direction>,
    pending: Option<PendingLine>,
    /// An armed window signals at most once.
    motif_fired: bool,
    bars_seen: usize,
    history: Vec<Candle>,
}

impl SignalState {
    fn new() -> Self {
        Self {
            armed: false,
            armed_since_index: None,
            window: Vec::new(),
            structures: Vec::new(),
            last_structure: None,
            motif_detected: false,
            motif_direction: None,
            pending: None,
            motif_fired: false,
            bars_seen: 0,
            history: Vec::new(),
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.armed_since_index = None;
        self.window.clear();
        self.structures.clear();
        self.last_structure = None;
        self.pending = None;
        self.motif_fired = false;
        self.motif_direction = None;
    }
}

/// The accumulator: one `SignalState` per tracked pair, stable iteration
/// order for reproducible backtests.
pub struct PatternAccumulator {
    rules: Box<dyn ArmingRules>,
    states: BTreeMap<String, SignalState>,
}

impl PatternAccumulator {
    pub fn new(rules: Box<dyn ArmingRules>) -> Self {
        Self { rules, states: BTreeMap::new() }
    }

    pub fn state(&self, pair: &str) -> Option<&SignalState> {
        self.states.get(pair)
    }

    /// Consume one closed bar for `pair`. Unseen pairs initialize fresh
    /// state; the accumulator is restartable from an empty window.
    pub fn update(&mut self, pair: &str, candle: &Candle) -> &SignalState {
        let state = self.states.entry(pair.to_string()).or_insert_with(SignalState::new);

        // One-shot flag from the previous tick expires now.
        state.motif_detected = false;

        state.history.push(candle.clone());
        if state.history.len() > MAX_HISTORY {
            state.history.remove(0);
        }
        let index = state.bars_seen;
        state.bars_seen += 1;

        let arm = self.rules.arm(&state.history);
        let reset = self.rules.reset(&state.history);

        if reset {
            // Reset takes precedence over arming on the same bar.
            if state.armed {
                info!(pair, index, "accumulation window reset");
            }
            state.disarm();
            return state;
        }

        if arm && !state.armed {
            state.armed = true;
            state.armed_since_index = Some(index);
            state.window.push(candle.clone());
            state.pending = Some(PendingLine::from_candle(index, candle));
            info!(pair, index, "armed, accumulation window opened");
            return state;
        }

        if state.armed {
            state.window.push(candle.clone());
            let pending = state
                .pending
                .get_or_insert_with(|| PendingLine::from_candle(index, candle));
            if pending.contains_or_contained(candle) {
                // Contained either way: the pending line absorbs the bar.
                return state;
            }

            // Confirm the pending line at the previous bar.
            let kind = classify(state.structures.last(), pending.high, pending.low);
            let confirmed = StructureLine {
                index: index.saturating_sub(1),
                high: pending.high,
                low: pending.low,
                kind,
            };
            state.structures.push(confirmed);
            state.last_structure = Some(confirmed);
            state.pending = Some(PendingLine::from_candle(index, candle));
            debug!(pair, index, ?kind, "structure line confirmed");

            if !state.motif_fired {
                if let Some(direction) = detect_motif(&state.structures) {
                    state.motif_detected = true;
                    state.motif_fired = true;
                    state.motif_direction = Some(direction);
                    info!(pair, index, ?direction, "three-phase motif detected");
                }
            }
        }

        state
    }
}
