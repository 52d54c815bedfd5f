//! The decision engine: tick scheduler, order lifecycle, and the
//! backtest / live drivers around them.

pub mod backtest;
pub mod config;
pub mod live;
mod order_manager;
pub mod scheduler;

pub use backtest::{run_backtest, BacktestReport};
pub use config::{EngineConfig, TrailingConfig};
pub use live::{run_live, Throttler};
pub use scheduler::Scheduler;
