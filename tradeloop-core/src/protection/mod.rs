//! Stoploss / ROI protection — per-tick resolution of the effective stop
//! price and take-profit threshold for an open trade.

pub mod exit;
pub mod roi;
pub mod stoploss;

pub use exit::ExitReason;
pub use roi::{RoiStep, RoiTable};
pub use stoploss::{StopAdjust, StoplossState};
