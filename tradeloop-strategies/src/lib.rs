//! Tradeloop Strategies — pluggable strategy material for the engine.
//!
//! This crate builds on `tradeloop-core` to provide:
//! - Windowed indicators evaluated over the arming-rules history view
//! - Bollinger-squeeze arming/reset predicates
//! - A ready-made hook-set preset for structure-breakout trading

pub mod hooks;
pub mod indicators;
pub mod squeeze;

pub use hooks::structure_hooks;
pub use indicators::{Bollinger, BollingerBands};
pub use squeeze::{BollingerSqueezeRules, SqueezeConfig};
