//! Order lifecycle management — fill settlement, timeouts, repricing.
//!
//! All exchange polling for a trade's working orders happens here. An
//! unavailable exchange is never fatal: the affected order is skipped and
//! retried on the next tick, so state only advances on confirmed
//! snapshots.

use crate::domain::{Candle, Order, OrderId, OrderSide, OrderStatus, Trade};
use crate::engine::config::EngineConfig;
use crate::exchange::{ExchangeClient, ExchangeError, OrderRequest};
use crate::hooks::{HookCtx, PriceAdjustment, StrategyHooks};
use crate::ledger::{self, AMOUNT_EPSILON};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Poll every active order and settle new fill slices into the ledger.
/// Returns the ids of orders that gained fill volume this tick, for
/// notification dispatch.
pub(crate) fn settle_fills<E: ExchangeClient>(
    exchange: &mut E,
    trade: &mut Trade,
    now: DateTime<Utc>,
) -> Vec<OrderId> {
    let mut filled = Vec::new();

    for id in trade.active_order_ids() {
        let snap = match exchange.get_status(id) {
            Ok(snap) => snap,
            Err(ExchangeError::Unavailable(reason)) => {
                warn!(order_id = %id, reason = %reason, "exchange unavailable, deferring settlement");
                continue;
            }
            Err(e) => {
                warn!(order_id = %id, error = %e, "order status query failed");
                continue;
            }
        };

        let Some(order) = trade.order(id) else { continue };
        let side = order.side;
        let prev_filled = order.filled_amount;
        let prev_status = order.status;
        let requested_price = order.requested_price;

        let delta = snap.filled_amount - prev_filled;
        if delta > AMOUNT_EPSILON {
            let price = snap.average_price.unwrap_or(requested_price);
            // Entry stakes commit quote currency; exit stakes release the
            // cost basis of the slice so stake and amount zero together.
            let stake = match side {
                OrderSide::Entry => delta * price / trade.leverage,
                OrderSide::Exit => delta * trade.open_rate / trade.leverage,
            };
            let settled = match side {
                OrderSide::Entry => ledger::on_entry_filled(trade, price, delta, stake),
                OrderSide::Exit => ledger::on_exit_filled(trade, price, delta, stake, now),
            };
            if let Err(e) = settled {
                warn!(order_id = %id, error = %e, "fill rejected by ledger");
                continue;
            }
            if let Some(order) = trade.order_mut(id) {
                order.filled_amount = snap.filled_amount;
                order.average_fill_price = snap.average_price.or(Some(price));
                order.stake_amount_filled += stake;
                if order.status != snap.status {
                    if let Err(e) = order.transition(snap.status) {
                        warn!(order_id = %id, error = %e, "order state divergence");
                    }
                }
            }
            filled.push(id);
        } else if snap.status != prev_status {
            // Terminal transition without new volume (canceled or expired
            // at the exchange).
            if let Some(order) = trade.order_mut(id) {
                if let Err(e) = order.transition(snap.status) {
                    warn!(order_id = %id, error = %e, "order state divergence");
                }
            }
            debug!(order_id = %id, status = ?snap.status, "order settled without fill");
        }
    }
    filled
}

/// Timeout and repricing pass over the trade's active orders.
///
/// Timeout cancels fire first; surviving orders run the price-adjustment
/// hook at most once per bar. Cancel-and-replace keeps the original order
/// whenever the exchange-side cancel fails, and a partially filled order
/// is never replaced (the already-filled slice stays in the ledger; only
/// an outright cancel can stop the remainder).
pub(crate) fn manage_open_orders<E: ExchangeClient>(
    exchange: &mut E,
    cfg: &EngineConfig,
    hooks: &StrategyHooks,
    trade: &mut Trade,
    candle: &Candle,
    now: DateTime<Utc>,
    bar: usize,
) {
    for id in trade.active_order_ids() {
        let Some(order) = trade.order(id).cloned() else { continue };

        // Timeout check: strategy hook decides, config age as fallback.
        let age_secs = (now - order.placed_at).num_seconds();
        let fallback = age_secs >= cfg.unfilled_timeout_secs(order.side) as i64;
        let cancel = {
            let ctx = hook_ctx(trade, candle, now);
            hooks.should_cancel_order(&ctx, &order, fallback)
        };
        if cancel {
            match exchange.cancel(id) {
                Ok(_) => {
                    info!(order_id = %id, pair = %trade.pair, age_secs, "unfilled order canceled");
                    mark_canceled(trade, id);
                }
                Err(e) => warn!(order_id = %id, error = %e, "cancel failed, order kept"),
            }
            continue;
        }

        // Repricing, at most once per bar per order.
        if order.last_reprice_bar == Some(bar) || !hooks.has_price_adjustment(&order) {
            continue;
        }
        let adjustment = {
            let ctx = hook_ctx(trade, candle, now);
            hooks.adjust_order_price(&ctx, &order)
        };
        if let Some(o) = trade.order_mut(id) {
            o.last_reprice_bar = Some(bar);
        }
        match adjustment {
            PriceAdjustment::Keep => {}
            PriceAdjustment::Cancel => match exchange.cancel(id) {
                Ok(_) => {
                    info!(order_id = %id, pair = %trade.pair, "order canceled by strategy");
                    mark_canceled(trade, id);
                }
                Err(e) => warn!(order_id = %id, error = %e, "cancel failed, order kept"),
            },
            PriceAdjustment::Replace(price) => {
                if order.filled_amount > AMOUNT_EPSILON {
                    warn!(order_id = %id, "partially filled order not replaced");
                    continue;
                }
                replace_order(exchange, trade, &order, price, now, bar);
            }
        }
    }
}

/// Cancel every order still working for a closed trade. A full exit can
/// settle while an adjustment order is still at the exchange; that order
/// must come down before the trade is archived. Orders the exchange
/// cannot cancel this tick stay active and are retried next tick.
pub(crate) fn cancel_remaining_orders<E: ExchangeClient>(exchange: &mut E, trade: &mut Trade) {
    for id in trade.active_order_ids() {
        match exchange.cancel(id) {
            Ok(_) => {
                info!(order_id = %id, pair = %trade.pair, "residual order canceled after close");
                mark_canceled(trade, id);
            }
            Err(e) => warn!(order_id = %id, error = %e, "cancel failed, order kept"),
        }
    }
}

fn hook_ctx<'a>(trade: &'a Trade, candle: &'a Candle, now: DateTime<Utc>) -> HookCtx<'a> {
    HookCtx {
        pair: &trade.pair,
        trade: Some(trade),
        now,
        candle,
        current_rate: candle.close,
    }
}

fn mark_canceled(trade: &mut Trade, id: OrderId) {
    if let Some(order) = trade.order_mut(id) {
        if let Err(e) = order.transition(OrderStatus::Canceled) {
            warn!(order_id = %id, error = %e, "order state divergence");
        }
    }
}

/// Cancel-then-place. The replacement is only submitted once the cancel
/// is confirmed; `Ok(false)` means the order went terminal first (likely
/// filled), in which case the next settlement pass picks it up.
fn replace_order<E: ExchangeClient>(
    exchange: &mut E,
    trade: &mut Trade,
    order: &Order,
    price: f64,
    now: DateTime<Utc>,
    bar: usize,
) {
    match exchange.cancel(order.id) {
        Ok(true) => mark_canceled(trade, order.id),
        Ok(false) => {
            debug!(order_id = %order.id, "order already terminal, replacement skipped");
            return;
        }
        Err(e) => {
            warn!(order_id = %order.id, error = %e, "cancel failed, order kept");
            return;
        }
    }

    let request = OrderRequest {
        pair: trade.pair.clone(),
        side: order.side,
        direction: trade.direction,
        price,
        amount: order.remaining_amount(),
    };
    match exchange.place(&request) {
        Ok(new_id) => {
            let mut replacement =
                Order::new(new_id, order.side, price, request.amount, now, bar);
            replacement.last_reprice_bar = Some(bar);
            info!(
                old_order_id = %order.id,
                new_order_id = %new_id,
                pair = %trade.pair,
                old_price = order.requested_price,
                new_price = price,
                "order repriced"
            );
            trade.orders.push(replacement);
        }
        Err(e) => {
            warn!(order_id = %order.id, error = %e, "replacement placement failed");
        }
    }
}
