//! Order-execution interface.
//!
//! The scheduler talks to the exchange through [`ExchangeClient`] only.
//! Transport failures surface as [`ExchangeError::Unavailable`] and are
//! treated by the scheduler as "no change this tick" — retried on the next
//! tick, never a crash. Cancellation is idempotent: canceling an order
//! that is already terminal is a no-op.

pub mod sim;

pub use sim::SimulatedExchange;

use crate::domain::{Candle, Direction, OrderId, OrderSide, OrderStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport failure; no state may be assumed changed.
    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    #[error("unknown order id {0}")]
    UnknownOrder(OrderId),
}

/// A request to place one order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub direction: Direction,
    pub price: f64,
    pub amount: f64,
}

/// Exchange-side view of an order, polled per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    pub filled_amount: f64,
    pub average_price: Option<f64>,
}

/// The order-execution interface the scheduler drives.
pub trait ExchangeClient {
    fn place(&mut self, request: &OrderRequest) -> Result<OrderId, ExchangeError>;

    /// Cancel an order. `Ok(true)` if this call canceled it, `Ok(false)`
    /// if it was already terminal (idempotent no-op).
    fn cancel(&mut self, id: OrderId) -> Result<bool, ExchangeError>;

    fn get_status(&mut self, id: OrderId) -> Result<OrderSnapshot, ExchangeError>;

    /// Tick boundary notification. Backtest exchanges use it to advance
    /// their simulated market; live clients typically ignore it.
    fn on_tick(&mut self, _now: DateTime<Utc>, _candles: &BTreeMap<String, Candle>) {}
}
