//! Tradeloop Core — the decision engine of an automated trading bot.
//!
//! This crate contains everything between closed candles in and orders out:
//! - Domain types (candles, orders, trades, ids)
//! - Pattern accumulator with armed state and structure-line motifs
//! - Cost-basis ledger over filled orders
//! - Stoploss ratchet and duration-stepped ROI table
//! - Order lifecycle state machine with timeouts and repricing
//! - Tick scheduler plus backtest and live drivers
//!
//! Strategy behavior plugs in through [`hooks::StrategyHooks`] and
//! [`pattern::ArmingRules`]; exchange access goes through
//! [`exchange::ExchangeClient`].

pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod hooks;
pub mod ledger;
pub mod pattern;
pub mod protection;

pub use error::EngineError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything that crosses the live-loop thread
    /// boundary is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
        require_send::<domain::TradeId>();
        require_sync::<domain::TradeId>();

        require_send::<protection::StoplossState>();
        require_sync::<protection::StoplossState>();
        require_send::<protection::RoiTable>();
        require_sync::<protection::RoiTable>();
        require_send::<protection::ExitReason>();
        require_sync::<protection::ExitReason>();

        require_send::<hooks::StrategyHooks>();
        require_sync::<hooks::StrategyHooks>();
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<exchange::SimulatedExchange>();
        require_sync::<exchange::SimulatedExchange>();
    }
}
