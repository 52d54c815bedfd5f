//! Ready-made hook set for structure-breakout trading.
//!
//! `structure_hooks` returns a pre-populated builder so callers can
//! stack further overrides before `build()`:
//!
//! - entry orders price at the signal bar's close instead of the
//!   engine-proposed rate;
//! - entry confirmation rejects quotes that drifted away from the
//!   signal close between detection and order placement;
//! - once unrealized profit clears `profit_trigger`, the stoploss
//!   ratchets to breakeven (the stake-weighted entry price).

use tracing::debug;
use tradeloop_core::hooks::StrategyHooksBuilder;

/// Maximum relative distance between the quoted rate and the signal
/// close before entry confirmation rejects.
pub const MAX_SIGNAL_DRIFT: f64 = 0.005;

/// Builder preset for breakout strategies. `profit_trigger` is the
/// leveraged profit ratio past which the stop moves to breakeven.
pub fn structure_hooks(profit_trigger: f64) -> StrategyHooksBuilder {
    StrategyHooksBuilder::default()
        .with_entry_price(|ctx, _proposed| Ok(ctx.candle.close))
        .with_confirm_entry(|ctx, rate, _stake| {
            let drift = (rate - ctx.candle.close).abs() / ctx.candle.close;
            if drift > MAX_SIGNAL_DRIFT {
                debug!(pair = %ctx.pair, rate, close = ctx.candle.close, "entry rejected, quote drifted from signal close");
            }
            Ok(drift <= MAX_SIGNAL_DRIFT)
        })
        .with_stoploss(move |ctx, after_fill| {
            if after_fill {
                return Ok(None);
            }
            let Some(trade) = ctx.trade else {
                return Ok(None);
            };
            if trade.current_profit_ratio(ctx.current_rate) < profit_trigger {
                return Ok(None);
            }
            // Distance from the current rate back to the entry price, in
            // price space: rate * (1 - gain) lands exactly on open_rate
            // for longs, rate * (1 + gain) for shorts.
            let gain = (ctx.current_rate - trade.open_rate) / ctx.current_rate
                * trade.direction.sign();
            if gain <= 0.0 {
                return Ok(None);
            }
            Ok(Some(-gain))
        })
}
