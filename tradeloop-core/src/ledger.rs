//! Cost-basis ledger — trade-level accounting over filled orders.
//!
//! `open_rate` is maintained as the stake-weighted average of filled entry
//! prices, so profit and exit decisions always run against correct
//! weighted averages. Exits are priced against `open_rate` and never move
//! it. All rejections leave the trade untouched.

use crate::domain::Trade;
use crate::protection::StopAdjust;
use thiserror::Error;
use tracing::{debug, info};

/// Positions smaller than this are considered fully closed.
pub const AMOUNT_EPSILON: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Adjustment math would violate accounting invariants.
    #[error("invalid adjustment on trade {trade_id}: {reason}")]
    InvalidAdjustment { trade_id: u64, reason: String },

    /// The trade is closed and accepts no further fills.
    #[error("trade {0} is closed")]
    TradeClosed(u64),
}

/// Outcome of `propose_adjustment`. Rejections carry the reason so the
/// scheduler can log them; they are never an abort.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    Accepted(Adjustment),
    Rejected(String),
}

/// An accepted position adjustment, resolved to concrete quantities.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    /// Additional entry: commit `stake` quote currency for `amount` base.
    Enter { stake: f64, amount: f64 },
    /// Partial (or full) exit of `amount` base units.
    Exit { amount: f64 },
}

/// Settle a filled entry slice into the trade.
///
/// Recomputes `open_rate` as the filled-amount-weighted average of entry
/// prices — equivalent to sum(filled_i * price_i) / sum(filled_i) over all
/// entry fills, and therefore independent of fill order.
pub fn on_entry_filled(
    trade: &mut Trade,
    price: f64,
    amount: f64,
    stake: f64,
) -> Result<(), LedgerError> {
    if !trade.is_open {
        return Err(LedgerError::TradeClosed(trade.id.0));
    }
    if amount <= 0.0 || price <= 0.0 {
        return Err(LedgerError::InvalidAdjustment {
            trade_id: trade.id.0,
            reason: format!("entry fill with non-positive amount {amount} or price {price}"),
        });
    }

    let prior_notional = trade.open_rate * trade.amount;
    trade.amount += amount;
    trade.open_rate = (prior_notional + price * amount) / trade.amount;
    trade.stake_amount += stake;
    trade.total_entry_stake += stake * trade.leverage;

    // Initial stop anchors at the first fill price; later fills leave the
    // ratchet alone (the post-fill refresh handles repricing).
    trade
        .stoploss
        .adjust(trade.direction, price, trade.stoploss.initial_stop_ratio, StopAdjust::Initial);

    debug!(
        trade_id = trade.id.0,
        pair = %trade.pair,
        price,
        amount,
        open_rate = trade.open_rate,
        "entry fill settled"
    );
    Ok(())
}

/// Settle a filled exit slice: realize profit against `open_rate`, shrink
/// the position, close the trade when the amount reaches zero.
///
/// `stake` is the cost-basis stake being released (amount x open_rate,
/// leverage-adjusted), so `stake_amount` and `amount` hit zero together.
pub fn on_exit_filled(
    trade: &mut Trade,
    price: f64,
    amount: f64,
    stake: f64,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), LedgerError> {
    if !trade.is_open {
        return Err(LedgerError::TradeClosed(trade.id.0));
    }
    if amount > trade.amount + AMOUNT_EPSILON {
        return Err(LedgerError::InvalidAdjustment {
            trade_id: trade.id.0,
            reason: format!("exit amount {amount} exceeds position amount {}", trade.amount),
        });
    }
    if stake > trade.stake_amount + AMOUNT_EPSILON {
        return Err(LedgerError::InvalidAdjustment {
            trade_id: trade.id.0,
            reason: format!("exit stake {stake} would overdraw stake_amount {}", trade.stake_amount),
        });
    }

    let slice_profit = (price - trade.open_rate) * amount * trade.direction.sign() * trade.leverage;
    trade.realized_profit += slice_profit;
    trade.amount = (trade.amount - amount).max(0.0);
    trade.stake_amount = (trade.stake_amount - stake).max(0.0);

    if trade.amount <= AMOUNT_EPSILON {
        trade.amount = 0.0;
        trade.stake_amount = 0.0;
        trade.is_open = false;
        trade.close_date = Some(now);
        info!(
            trade_id = trade.id.0,
            pair = %trade.pair,
            realized_profit = trade.realized_profit,
            "trade fully exited"
        );
    }
    Ok(())
}

/// Validate a strategy-requested stake adjustment and resolve it to
/// concrete quantities.
///
/// Positive deltas are new-entry requests and must land inside
/// [min_stake, max_stake]; out-of-range requests are rejected whole, never
/// clamped (clamping would silently oversize orders). Negative deltas are
/// exit requests sized by the trade's own stake/amount ratio, so the
/// result is insensitive to unrealized P&L.
pub fn propose_adjustment(
    trade: &Trade,
    stake_delta: f64,
    current_rate: f64,
    min_stake: f64,
    max_stake: f64,
) -> AdjustmentOutcome {
    if !stake_delta.is_finite() || stake_delta == 0.0 {
        return AdjustmentOutcome::Rejected("empty or non-finite stake delta".into());
    }

    if stake_delta > 0.0 {
        if stake_delta < min_stake {
            return AdjustmentOutcome::Rejected(format!(
                "stake delta {stake_delta} below min stake {min_stake}"
            ));
        }
        if stake_delta > max_stake {
            return AdjustmentOutcome::Rejected(format!(
                "stake delta {stake_delta} above max stake {max_stake}"
            ));
        }
        if current_rate <= 0.0 {
            return AdjustmentOutcome::Rejected(format!("invalid rate {current_rate}"));
        }
        let amount = stake_delta * trade.leverage / current_rate;
        return AdjustmentOutcome::Accepted(Adjustment::Enter { stake: stake_delta, amount });
    }

    // Exit request.
    let magnitude = stake_delta.abs();
    if magnitude > trade.stake_amount + AMOUNT_EPSILON {
        return AdjustmentOutcome::Rejected(format!(
            "exit delta {magnitude} exceeds committed stake {}",
            trade.stake_amount
        ));
    }
    if trade.stake_amount <= 0.0 || trade.amount <= 0.0 {
        return AdjustmentOutcome::Rejected("no open position to reduce".into());
    }
    let amount = (magnitude * trade.amount / trade.stake_amount).min(trade.amount);
    AdjustmentOutcome::Accepted(Adjustment::Exit { amount })
}
