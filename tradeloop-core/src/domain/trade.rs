//! Trade — an open or closed position with its append-only order history.

use super::ids::{OrderId, TradeId};
use super::order::Order;
use crate::protection::{ExitReason, StoplossState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short; multiplies raw price deltas into P&L.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// A position and its accounting state.
///
/// `open_rate` is the stake-weighted average over **filled entry orders**
/// only — exits never move it. `stake_amount` is quote currency committed,
/// independent of leverage, and never goes negative: the ledger rejects
/// exits that would overdraw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub pair: String,
    pub direction: Direction,
    pub leverage: f64,
    pub open_date: DateTime<Utc>,
    pub close_date: Option<DateTime<Utc>>,
    /// Append-only order history. Orders are owned by exactly one trade.
    pub orders: Vec<Order>,
    /// Base-asset quantity currently held.
    pub amount: f64,
    /// Quote currency currently committed (entry stakes minus released exits).
    pub stake_amount: f64,
    /// Stake-weighted average entry price over filled entry orders.
    pub open_rate: f64,
    /// Sum of all filled entry stakes; exits do not subtract.
    /// Denominator for the realized profit ratio.
    pub total_entry_stake: f64,
    pub realized_profit: f64,
    pub is_open: bool,
    /// Reason behind the most recent full-exit order, if any was placed.
    pub exit_reason: Option<ExitReason>,
    pub stoploss: StoplossState,
}

impl Trade {
    pub fn new(
        id: TradeId,
        pair: impl Into<String>,
        direction: Direction,
        leverage: f64,
        open_date: DateTime<Utc>,
        stoploss_floor: f64,
    ) -> Self {
        Self {
            id,
            pair: pair.into(),
            direction,
            leverage,
            open_date,
            close_date: None,
            orders: Vec::new(),
            amount: 0.0,
            stake_amount: 0.0,
            open_rate: 0.0,
            total_entry_stake: 0.0,
            realized_profit: 0.0,
            is_open: true,
            exit_reason: None,
            stoploss: StoplossState::new(stoploss_floor),
        }
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn order_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    /// Ids of orders still working at the exchange.
    pub fn active_order_ids(&self) -> Vec<OrderId> {
        self.orders.iter().filter(|o| o.is_active()).map(|o| o.id).collect()
    }

    pub fn has_active_orders(&self) -> bool {
        self.orders.iter().any(|o| o.is_active())
    }

    pub fn has_active_exit_order(&self) -> bool {
        self.orders
            .iter()
            .any(|o| o.is_active() && o.side == super::order::OrderSide::Exit)
    }

    /// True once at least one entry fill has landed and the position has
    /// not been fully exited.
    pub fn has_position(&self) -> bool {
        self.is_open && self.amount > 0.0
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.open_date
    }

    /// Unrealized profit ratio of the remaining position at `rate`,
    /// leverage applied. Zero before the first fill.
    pub fn current_profit_ratio(&self, rate: f64) -> f64 {
        if self.open_rate <= 0.0 || self.amount <= 0.0 {
            return 0.0;
        }
        let raw = (rate - self.open_rate) / self.open_rate;
        raw * self.direction.sign() * self.leverage
    }

    /// Realized profit as a ratio of everything staked on entries.
    pub fn realized_profit_ratio(&self) -> f64 {
        if self.total_entry_stake <= 0.0 {
            return 0.0;
        }
        self.realized_profit / self.total_entry_stake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> Trade {
        Trade::new(
            TradeId(1),
            "ETH/USDT",
            Direction::Long,
            1.0,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            -0.05,
        )
    }

    #[test]
    fn fresh_trade_has_no_position() {
        let trade = sample_trade();
        assert!(trade.is_open);
        assert!(!trade.has_position());
        assert_eq!(trade.current_profit_ratio(100.0), 0.0);
    }

    #[test]
    fn profit_ratio_respects_direction_and_leverage() {
        let mut trade = sample_trade();
        trade.open_rate = 100.0;
        trade.amount = 1.0;
        assert!((trade.current_profit_ratio(110.0) - 0.10).abs() < 1e-12);

        trade.direction = Direction::Short;
        assert!((trade.current_profit_ratio(110.0) + 0.10).abs() < 1e-12);

        trade.leverage = 3.0;
        assert!((trade.current_profit_ratio(110.0) + 0.30).abs() < 1e-12);
    }

    #[test]
    fn realized_ratio_uses_entry_stake_denominator() {
        let mut trade = sample_trade();
        trade.total_entry_stake = 1700.0;
        trade.realized_profit = 150.0;
        assert!((trade.realized_profit_ratio() - 150.0 / 1700.0).abs() < 1e-12);
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let deser: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade.id, deser.id);
        assert_eq!(trade.pair, deser.pair);
        assert_eq!(trade.is_open, deser.is_open);
    }
}
