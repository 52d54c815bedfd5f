//! Structure lines — containment-merged bar ranges and the three-phase
//! motif detector.
//!
//! Merge rule: while a window is open, consecutive bars whose ranges
//! contain each other collapse into one pending line; a non-containing bar
//! confirms the pending line (stamped at the previous index) and starts a
//! new one. Confirmed lines feed the motif scan.

use crate::domain::{Candle, Direction};
use serde::{Deserialize, Serialize};

/// Classification of a confirmed structure line against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    /// First line of a window, or mixed high/low movement.
    Undefined,
    /// Higher high and higher low than the previous line.
    High,
    /// Lower high and lower low than the previous line.
    Low,
}

/// A confirmed structure line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureLine {
    /// Window-relative bar index the line was confirmed at.
    pub index: usize,
    pub high: f64,
    pub low: f64,
    pub kind: StructureKind,
}

/// A structure line still absorbing contained bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingLine {
    pub start_index: usize,
    pub high: f64,
    pub low: f64,
}

impl PendingLine {
    pub fn from_candle(index: usize, candle: &Candle) -> Self {
        Self { start_index: index, high: candle.high, low: candle.low }
    }

    /// True when either range contains the other — the bar merges into
    /// this line instead of confirming it.
    pub fn contains_or_contained(&self, candle: &Candle) -> bool {
        let prev_contains = self.high >= candle.high && self.low <= candle.low;
        let curr_contains = candle.high >= self.high && candle.low <= self.low;
        prev_contains || curr_contains
    }
}

/// Classify a new line against the previous confirmed one.
pub fn classify(prev: Option<&StructureLine>, high: f64, low: f64) -> StructureKind {
    match prev {
        None => StructureKind::Undefined,
        Some(p) => {
            if high > p.high && low > p.low {
                StructureKind::High
            } else if high < p.high && low < p.low {
                StructureKind::Low
            } else {
                StructureKind::Undefined
            }
        }
    }
}

/// Scan all consecutive triples for the three-phase motif.
///
/// Long signal: the middle line sits strictly below both neighbours on
/// high and low (high -> low -> high, a bottom reversal). The symmetric
/// low -> high -> low shape is the short signal.
pub fn detect_motif(lines: &[StructureLine]) -> Option<Direction> {
    if lines.len() < 3 {
        return None;
    }
    for w in lines.windows(3) {
        let (s1, s2, s3) = (&w[0], &w[1], &w[2]);
        let long = s2.high < s1.high && s2.low < s1.low && s2.high < s3.high && s2.low < s3.low;
        if long {
            return Some(Direction::Long);
        }
        let short = s2.high > s1.high && s2.low > s1.low && s2.high > s3.high && s2.low > s3.low;
        if short {
            return Some(Direction::Short);
        }
    }
    None
}
