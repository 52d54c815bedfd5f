//! Exit reasons and their fixed evaluation order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a trade exit was triggered this tick.
///
/// Evaluation order per tick is fixed: custom exit signal, then stop
/// breach (reported as `TrailingStop` once the stop has ratcheted off the
/// floor, `Stoploss` otherwise), then ROI — all against the same tick's
/// data, first confirmed reason wins. A `confirm_exit` rejection
/// suppresses that reason for the tick only; lower-priority reasons
/// already triggered are still offered (suppress-and-continue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Strategy custom-exit signal, with the tag it returned.
    CustomExit(String),
    /// Stop price breached while still at the floor-derived level.
    Stoploss,
    /// Profit ratio reached the effective minimum-ROI threshold.
    Roi,
    /// Stop price breached after the stop had ratcheted off the floor.
    TrailingStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::CustomExit(tag) => write!(f, "custom_exit:{tag}"),
            ExitReason::Stoploss => write!(f, "stoploss"),
            ExitReason::Roi => write!(f, "roi"),
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
        }
    }
}
