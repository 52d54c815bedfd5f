//! Simulated exchange for backtests and engine tests.
//!
//! Limit orders fill against the tick candle, never on the bar they were
//! placed (no lookahead): buy-side orders fill when the candle's low
//! crosses the limit, sell-side when the high crosses it, always at the
//! requested price. Partial fills and transport failures can be scripted
//! for tests.

use super::{ExchangeClient, ExchangeError, OrderRequest, OrderSnapshot};
use crate::domain::{Candle, Direction, OrderId, OrderSide, OrderStatus};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct SimOrder {
    request: OrderRequest,
    status: OrderStatus,
    filled_amount: f64,
    placed_tick: u64,
    last_eval_tick: Option<u64>,
}

impl SimOrder {
    fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            status: self.status,
            filled_amount: self.filled_amount,
            average_price: if self.filled_amount > 0.0 {
                Some(self.request.price)
            } else {
                None
            },
        }
    }

    /// Buy-side orders (entry long, exit short) fill when price trades at
    /// or below the limit; sell-side when at or above.
    fn crosses(&self, candle: &Candle) -> bool {
        let buy_side = matches!(
            (self.request.side, self.request.direction),
            (OrderSide::Entry, Direction::Long) | (OrderSide::Exit, Direction::Short)
        );
        if buy_side {
            candle.low <= self.request.price
        } else {
            candle.high >= self.request.price
        }
    }
}

/// In-memory exchange with scripted behavior.
#[derive(Default)]
pub struct SimulatedExchange {
    orders: HashMap<OrderId, SimOrder>,
    next_id: u64,
    tick: u64,
    candles: BTreeMap<String, Candle>,
    unavailable: bool,
    /// When set, the first crossing tick fills only this fraction;
    /// the next crossing tick completes the order.
    partial_fill_ratio: Option<f64>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until cleared.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn set_partial_fill_ratio(&mut self, ratio: Option<f64>) {
        self.partial_fill_ratio = ratio;
    }

    fn guard(&self) -> Result<(), ExchangeError> {
        if self.unavailable {
            Err(ExchangeError::Unavailable("scripted outage".into()))
        } else {
            Ok(())
        }
    }

    fn evaluate(&mut self, id: OrderId) -> Result<(), ExchangeError> {
        let tick = self.tick;
        let partial = self.partial_fill_ratio;
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(ExchangeError::UnknownOrder(id))?;

        if order.status.is_terminal()
            || tick <= order.placed_tick
            || order.last_eval_tick == Some(tick)
        {
            return Ok(());
        }
        order.last_eval_tick = Some(tick);

        let Some(candle) = self.candles.get(&order.request.pair) else {
            return Ok(()); // gap: no candle for this pair this tick
        };
        if !order.crosses(candle) {
            return Ok(());
        }

        match (partial, order.status) {
            (Some(ratio), OrderStatus::Open) => {
                order.filled_amount = order.request.amount * ratio.clamp(0.0, 1.0);
                order.status = OrderStatus::PartiallyFilled;
            }
            _ => {
                order.filled_amount = order.request.amount;
                order.status = OrderStatus::Filled;
            }
        }
        debug!(order_id = %id, status = ?order.status, filled = order.filled_amount, "sim fill");
        Ok(())
    }
}

impl ExchangeClient for SimulatedExchange {
    fn place(&mut self, request: &OrderRequest) -> Result<OrderId, ExchangeError> {
        self.guard()?;
        self.next_id += 1;
        let id = OrderId(self.next_id);
        self.orders.insert(
            id,
            SimOrder {
                request: request.clone(),
                status: OrderStatus::Open,
                filled_amount: 0.0,
                placed_tick: self.tick,
                last_eval_tick: None,
            },
        );
        Ok(id)
    }

    fn cancel(&mut self, id: OrderId) -> Result<bool, ExchangeError> {
        self.guard()?;
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(ExchangeError::UnknownOrder(id))?;
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.status = OrderStatus::Canceled;
        Ok(true)
    }

    fn get_status(&mut self, id: OrderId) -> Result<OrderSnapshot, ExchangeError> {
        self.guard()?;
        self.evaluate(id)?;
        let order = self.orders.get(&id).ok_or(ExchangeError::UnknownOrder(id))?;
        Ok(order.snapshot())
    }

    fn on_tick(&mut self, _now: DateTime<Utc>, candles: &BTreeMap<String, Candle>) {
        self.tick += 1;
        self.candles = candles.clone();
    }
}
