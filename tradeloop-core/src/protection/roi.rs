//! Minimum-ROI table — duration-stepped take-profit thresholds.

use serde::{Deserialize, Serialize};

/// One step of the ROI table: after `after_secs` elapsed, the minimum
/// profit ratio that triggers a take-profit exit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiStep {
    pub after_secs: u64,
    pub ratio: f64,
}

/// Duration-stepped ROI thresholds, kept sorted by trigger time.
///
/// Lookup picks the step with the largest `after_secs` that is <= the
/// elapsed time. An empty table never triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RoiTableRepr")]
pub struct RoiTable {
    steps: Vec<RoiStep>,
}

// Deserialization goes through `new` so the steps end up sorted.
#[derive(Deserialize)]
struct RoiTableRepr {
    steps: Vec<RoiStep>,
}

impl From<RoiTableRepr> for RoiTable {
    fn from(repr: RoiTableRepr) -> Self {
        Self::new(repr.steps)
    }
}

impl RoiTable {
    pub fn new(mut steps: Vec<RoiStep>) -> Self {
        steps.sort_by_key(|s| s.after_secs);
        Self { steps }
    }

    /// Threshold in force after `elapsed_secs`, if any step applies yet.
    pub fn threshold(&self, elapsed_secs: i64) -> Option<f64> {
        if elapsed_secs < 0 {
            return None;
        }
        self.steps
            .iter()
            .rev()
            .find(|s| s.after_secs as i64 <= elapsed_secs)
            .map(|s| s.ratio)
    }

    /// Effective threshold once a strategy override is considered: the
    /// lower of the two. Non-finite overrides are ignored.
    pub fn effective_threshold(&self, elapsed_secs: i64, hook_value: Option<f64>) -> Option<f64> {
        let table = self.threshold(elapsed_secs);
        match (table, hook_value.filter(|v| v.is_finite())) {
            (Some(t), Some(o)) => Some(t.min(o)),
            (Some(t), None) => Some(t),
            (None, Some(o)) => Some(o),
            (None, None) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for RoiTable {
    /// Effectively disabled: a threshold so high it never triggers.
    fn default() -> Self {
        Self::new(vec![RoiStep { after_secs: 0, ratio: 100.0 }])
    }
}
