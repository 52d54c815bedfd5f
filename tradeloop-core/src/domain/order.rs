//! Order types and the order lifecycle state machine.

use super::ids::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of a trade this order serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    /// Opens or increases the position.
    Entry,
    /// Reduces or closes the position.
    Exit,
}

/// Order lifecycle states.
///
/// Legal transitions: `Open → {PartiallyFilled, Filled, Canceled, Expired}`,
/// `PartiallyFilled → {Filled, Canceled}`. `Filled`, `Canceled` and
/// `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Expired)
    }
}

/// Errors from order state manipulation.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid transition for order {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {0} not found on trade")]
    OrderNotFound(OrderId),
}

/// A single order, owned by exactly one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub requested_price: f64,
    pub requested_amount: f64,
    pub filled_amount: f64,
    /// Volume-weighted price of the filled portion, if any.
    pub average_fill_price: Option<f64>,
    /// Quote-currency stake settled by fills so far (leverage-adjusted).
    pub stake_amount_filled: f64,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    /// Tick index at placement; used for bar-based bookkeeping.
    pub placed_bar: usize,
    /// Last tick the price-adjustment hook ran for this order.
    /// The hook is invoked at most once per bar per order.
    pub last_reprice_bar: Option<usize>,
}

impl Order {
    pub fn new(
        id: OrderId,
        side: OrderSide,
        price: f64,
        amount: f64,
        placed_at: DateTime<Utc>,
        placed_bar: usize,
    ) -> Self {
        Self {
            id,
            side,
            requested_price: price,
            requested_amount: amount,
            filled_amount: 0.0,
            average_fill_price: None,
            stake_amount_filled: 0.0,
            status: OrderStatus::Open,
            placed_at,
            placed_bar,
            last_reprice_bar: None,
        }
    }

    pub fn remaining_amount(&self) -> f64 {
        self.requested_amount - self.filled_amount
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Open or partially filled — still working at the exchange.
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Price the filled portion actually settled at, falling back to the
    /// requested price when nothing has filled yet.
    pub fn safe_fill_price(&self) -> f64 {
        self.average_fill_price.unwrap_or(self.requested_price)
    }

    /// Apply a state transition, validating it against the lifecycle table.
    pub fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        let legal = match (self.status, to) {
            (OrderStatus::Open, OrderStatus::PartiallyFilled)
            | (OrderStatus::Open, OrderStatus::Filled)
            | (OrderStatus::Open, OrderStatus::Canceled)
            | (OrderStatus::Open, OrderStatus::Expired)
            | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
            | (OrderStatus::PartiallyFilled, OrderStatus::Canceled) => true,
            (from, to) if from == to => true, // no-op
            _ => false,
        };
        if !legal {
            return Err(OrderError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_order() -> Order {
        Order::new(
            OrderId(1),
            OrderSide::Entry,
            100.0,
            10.0,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            0,
        )
    }

    #[test]
    fn order_remaining_amount() {
        let mut order = sample_order();
        order.filled_amount = 3.0;
        assert_eq!(order.remaining_amount(), 7.0);
    }

    #[test]
    fn order_is_active_through_partial_fill() {
        let mut order = sample_order();
        assert!(order.is_active());
        order.transition(OrderStatus::PartiallyFilled).unwrap();
        assert!(order.is_active());
        order.transition(OrderStatus::Filled).unwrap();
        assert!(!order.is_active());
        assert!(order.is_terminal());
    }

    #[test]
    fn terminal_orders_reject_further_transitions() {
        let mut order = sample_order();
        order.transition(OrderStatus::Canceled).unwrap();
        let err = order.transition(OrderStatus::Filled).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[test]
    fn partially_filled_cannot_expire() {
        let mut order = sample_order();
        order.transition(OrderStatus::PartiallyFilled).unwrap();
        assert!(order.transition(OrderStatus::Expired).is_err());
    }

    #[test]
    fn same_state_transition_is_noop() {
        let mut order = sample_order();
        order.transition(OrderStatus::Open).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn safe_fill_price_falls_back_to_requested() {
        let mut order = sample_order();
        assert_eq!(order.safe_fill_price(), 100.0);
        order.average_fill_price = Some(99.5);
        assert_eq!(order.safe_fill_price(), 99.5);
    }
}
