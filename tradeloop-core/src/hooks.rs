//! Strategy hook contract — a capability set of optional override slots.
//!
//! Every hook is an optional named function slot with a fixed default,
//! resolved once at engine construction. Hooks are synchronous,
//! non-reentrant and expected to be fast; they receive an explicit
//! [`HookCtx`] per invocation instead of reading shared "current bar"
//! state. A hook that returns an error is caught here, logged with pair /
//! trade / hook context, and replaced by its default so a single
//! misbehaving override cannot crash the tick loop.

use crate::domain::{Candle, Order, Trade};
use crate::protection::ExitReason;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

/// Error raised by a strategy override. Suppressed at the scheduler
/// boundary and treated as "no action".
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Mutually exclusive hook combinations detected at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("conflicting hooks configured: {0}")]
    ConfigConflict(String),

    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}

pub type HookResult<T> = Result<T, HookError>;

/// Per-invocation context passed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct HookCtx<'a> {
    pub pair: &'a str,
    /// The trade under evaluation; `None` pre-entry.
    pub trade: Option<&'a Trade>,
    pub now: DateTime<Utc>,
    pub candle: &'a Candle,
    pub current_rate: f64,
}

impl HookCtx<'_> {
    fn trade_id(&self) -> Option<u64> {
        self.trade.map(|t| t.id.0)
    }
}

/// Outcome of the order-price-adjustment hook, normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceAdjustment {
    /// Leave the order as it is (returned the unchanged price, hook
    /// absent, or hook failed).
    Keep,
    /// Cancel and replace at the new price.
    Replace(f64),
    /// Cancel outright without replacement.
    Cancel,
}

type Slot<T> = Option<Box<T>>;

type LeverageFn = dyn Fn(&HookCtx, f64) -> HookResult<f64> + Send + Sync;
type StakeFn = dyn Fn(&HookCtx, f64, f64, f64) -> HookResult<f64> + Send + Sync;
type PriceFn = dyn Fn(&HookCtx, f64) -> HookResult<f64> + Send + Sync;
type ConfirmEntryFn = dyn Fn(&HookCtx, f64, f64) -> HookResult<bool> + Send + Sync;
type ConfirmExitFn = dyn Fn(&HookCtx, &ExitReason) -> HookResult<bool> + Send + Sync;
type StoplossFn = dyn Fn(&HookCtx, bool) -> HookResult<Option<f64>> + Send + Sync;
type RoiFn = dyn Fn(&HookCtx) -> HookResult<Option<f64>> + Send + Sync;
type CustomExitFn = dyn Fn(&HookCtx) -> HookResult<Option<String>> + Send + Sync;
type CancelOrderFn = dyn Fn(&HookCtx, &Order) -> HookResult<bool> + Send + Sync;
type AdjustOrderPriceFn = dyn Fn(&HookCtx, &Order) -> HookResult<Option<f64>> + Send + Sync;
type AdjustPositionFn = dyn Fn(&HookCtx, f64, f64) -> HookResult<Option<f64>> + Send + Sync;
type OrderFilledFn = dyn Fn(&HookCtx, &Order) -> HookResult<()> + Send + Sync;
type TickStartedFn = dyn Fn(DateTime<Utc>) -> HookResult<()> + Send + Sync;

/// The resolved hook set. Build through [`StrategyHooksBuilder`]; the
/// builder rejects mutually exclusive combinations with
/// [`ConfigError::ConfigConflict`] so the engine never starts with an
/// ambiguous contract.
#[derive(Default)]
pub struct StrategyHooks {
    resolve_leverage: Slot<LeverageFn>,
    resolve_stake_amount: Slot<StakeFn>,
    resolve_entry_price: Slot<PriceFn>,
    resolve_exit_price: Slot<PriceFn>,
    confirm_entry: Slot<ConfirmEntryFn>,
    confirm_exit: Slot<ConfirmExitFn>,
    resolve_stoploss: Slot<StoplossFn>,
    resolve_roi: Slot<RoiFn>,
    custom_exit: Slot<CustomExitFn>,
    should_cancel_entry_order: Slot<CancelOrderFn>,
    should_cancel_exit_order: Slot<CancelOrderFn>,
    adjust_order_price: Slot<AdjustOrderPriceFn>,
    adjust_entry_price: Slot<AdjustOrderPriceFn>,
    adjust_exit_price: Slot<AdjustOrderPriceFn>,
    adjust_position: Slot<AdjustPositionFn>,
    on_order_filled: Slot<OrderFilledFn>,
    tick_started: Slot<TickStartedFn>,
}

macro_rules! suppress {
    ($ctx:expr, $hook:expr, $result:expr, $default:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    pair = %$ctx.pair,
                    trade_id = ?$ctx.trade_id(),
                    hook = $hook,
                    error = %e,
                    "strategy hook failed, using default"
                );
                $default
            }
        }
    };
}

impl StrategyHooks {
    pub fn builder() -> StrategyHooksBuilder {
        StrategyHooksBuilder::default()
    }

    /// Leverage for a new trade. Default: the proposed (configured) value.
    pub fn leverage(&self, ctx: &HookCtx, proposed: f64) -> f64 {
        match &self.resolve_leverage {
            None => proposed,
            Some(f) => suppress!(ctx, "resolve_leverage", f(ctx, proposed), proposed),
        }
    }

    /// Stake for a new trade. The scheduler clamps the result into
    /// [min, max] afterwards — initial sizing has no reject semantics.
    pub fn stake_amount(&self, ctx: &HookCtx, proposed: f64, min: f64, max: f64) -> f64 {
        match &self.resolve_stake_amount {
            None => proposed,
            Some(f) => suppress!(ctx, "resolve_stake_amount", f(ctx, proposed, min, max), proposed),
        }
    }

    /// Entry price override. Default: the proposed price (tick close).
    pub fn entry_price(&self, ctx: &HookCtx, proposed: f64) -> f64 {
        match &self.resolve_entry_price {
            None => proposed,
            Some(f) => suppress!(ctx, "resolve_entry_price", f(ctx, proposed), proposed),
        }
    }

    /// Exit price override. Default: the proposed price (tick close).
    pub fn exit_price(&self, ctx: &HookCtx, proposed: f64) -> f64 {
        match &self.resolve_exit_price {
            None => proposed,
            Some(f) => suppress!(ctx, "resolve_exit_price", f(ctx, proposed), proposed),
        }
    }

    /// Entry confirmation. Default: true.
    pub fn confirm_entry(&self, ctx: &HookCtx, rate: f64, stake: f64) -> bool {
        match &self.confirm_entry {
            None => true,
            Some(f) => suppress!(ctx, "confirm_entry", f(ctx, rate, stake), true),
        }
    }

    /// Exit confirmation for a triggered reason. Default: true.
    pub fn confirm_exit(&self, ctx: &HookCtx, reason: &ExitReason) -> bool {
        match &self.confirm_exit {
            None => true,
            Some(f) => suppress!(ctx, "confirm_exit", f(ctx, reason), true),
        }
    }

    /// Stoploss ratio proposal. `after_fill` marks the one post-fill
    /// invocation that may move the stop in either direction.
    /// Default: no proposal.
    pub fn stoploss(&self, ctx: &HookCtx, after_fill: bool) -> Option<f64> {
        match &self.resolve_stoploss {
            None => None,
            Some(f) => suppress!(ctx, "resolve_stoploss", f(ctx, after_fill), None),
        }
    }

    /// ROI threshold override. Default: none (table applies alone).
    pub fn roi(&self, ctx: &HookCtx) -> Option<f64> {
        match &self.resolve_roi {
            None => None,
            Some(f) => suppress!(ctx, "resolve_roi", f(ctx), None),
        }
    }

    /// Custom exit signal. Default: none.
    pub fn custom_exit(&self, ctx: &HookCtx) -> Option<String> {
        match &self.custom_exit {
            None => None,
            Some(f) => suppress!(ctx, "custom_exit", f(ctx), None),
        }
    }

    /// Timeout predicate for an unfilled order, by side. The default
    /// (`fallback`) is the config-driven age check computed by the caller.
    pub fn should_cancel_order(&self, ctx: &HookCtx, order: &Order, fallback: bool) -> bool {
        use crate::domain::OrderSide;
        let (slot, name) = match order.side {
            OrderSide::Entry => (&self.should_cancel_entry_order, "should_cancel_entry_order"),
            OrderSide::Exit => (&self.should_cancel_exit_order, "should_cancel_exit_order"),
        };
        match slot {
            None => fallback,
            Some(f) => suppress!(ctx, name, f(ctx, order), fallback),
        }
    }

    /// Whether any price-adjustment hook applies to this order's side.
    pub fn has_price_adjustment(&self, order: &Order) -> bool {
        use crate::domain::OrderSide;
        if self.adjust_order_price.is_some() {
            return true;
        }
        match order.side {
            OrderSide::Entry => self.adjust_entry_price.is_some(),
            OrderSide::Exit => self.adjust_exit_price.is_some(),
        }
    }

    /// Run the price-adjustment hook for an open order and normalize the
    /// outcome. Returning the unchanged price is a no-op; a new price
    /// requests cancel-and-replace; `None` cancels outright.
    pub fn adjust_order_price(&self, ctx: &HookCtx, order: &Order) -> PriceAdjustment {
        use crate::domain::OrderSide;
        let (slot, name) = if self.adjust_order_price.is_some() {
            (&self.adjust_order_price, "adjust_order_price")
        } else {
            match order.side {
                OrderSide::Entry => (&self.adjust_entry_price, "adjust_entry_price"),
                OrderSide::Exit => (&self.adjust_exit_price, "adjust_exit_price"),
            }
        };
        let Some(f) = slot else {
            return PriceAdjustment::Keep;
        };
        match suppress!(ctx, name, f(ctx, order).map(Some), None) {
            None => PriceAdjustment::Keep, // hook failed
            Some(None) => PriceAdjustment::Cancel,
            Some(Some(price)) if (price - order.requested_price).abs() < f64::EPSILON => {
                PriceAdjustment::Keep
            }
            Some(Some(price)) if price.is_finite() && price > 0.0 => {
                PriceAdjustment::Replace(price)
            }
            Some(Some(price)) => {
                warn!(pair = %ctx.pair, hook = name, price, "ignoring invalid replacement price");
                PriceAdjustment::Keep
            }
        }
    }

    /// Position adjustment request in stake currency. Default: none.
    pub fn adjust_position(&self, ctx: &HookCtx, min_stake: f64, max_stake: f64) -> Option<f64> {
        match &self.adjust_position {
            None => None,
            Some(f) => suppress!(ctx, "adjust_position", f(ctx, min_stake, max_stake), None),
        }
    }

    /// Fill notification, invoked exactly once per transition into
    /// Filled / PartiallyFilled.
    pub fn order_filled(&self, ctx: &HookCtx, order: &Order) {
        if let Some(f) = &self.on_order_filled {
            suppress!(ctx, "on_order_filled", f(ctx, order), ());
        }
    }

    /// Pair-independent per-tick precompute.
    pub fn tick_started(&self, now: DateTime<Utc>) {
        if let Some(f) = &self.tick_started {
            if let Err(e) = f(now) {
                warn!(hook = "tick_started", error = %e, "strategy hook failed, ignoring");
            }
        }
    }
}

/// Builder for [`StrategyHooks`]. Each `with_*` installs one slot.
#[derive(Default)]
pub struct StrategyHooksBuilder {
    hooks: StrategyHooks,
}

impl StrategyHooksBuilder {
    pub fn with_leverage<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64) -> HookResult<f64> + Send + Sync + 'static,
    {
        self.hooks.resolve_leverage = Some(Box::new(f));
        self
    }

    pub fn with_stake_amount<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64, f64, f64) -> HookResult<f64> + Send + Sync + 'static,
    {
        self.hooks.resolve_stake_amount = Some(Box::new(f));
        self
    }

    pub fn with_entry_price<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64) -> HookResult<f64> + Send + Sync + 'static,
    {
        self.hooks.resolve_entry_price = Some(Box::new(f));
        self
    }

    pub fn with_exit_price<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64) -> HookResult<f64> + Send + Sync + 'static,
    {
        self.hooks.resolve_exit_price = Some(Box::new(f));
        self
    }

    pub fn with_confirm_entry<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64, f64) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.hooks.confirm_entry = Some(Box::new(f));
        self
    }

    pub fn with_confirm_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &ExitReason) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.hooks.confirm_exit = Some(Box::new(f));
        self
    }

    pub fn with_stoploss<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, bool) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.resolve_stoploss = Some(Box::new(f));
        self
    }

    pub fn with_roi<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.resolve_roi = Some(Box::new(f));
        self
    }

    pub fn with_custom_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx) -> HookResult<Option<String>> + Send + Sync + 'static,
    {
        self.hooks.custom_exit = Some(Box::new(f));
        self
    }

    pub fn with_should_cancel_entry_order<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.hooks.should_cancel_entry_order = Some(Box::new(f));
        self
    }

    pub fn with_should_cancel_exit_order<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<bool> + Send + Sync + 'static,
    {
        self.hooks.should_cancel_exit_order = Some(Box::new(f));
        self
    }

    pub fn with_adjust_order_price<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.adjust_order_price = Some(Box::new(f));
        self
    }

    pub fn with_adjust_entry_price<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.adjust_entry_price = Some(Box::new(f));
        self
    }

    pub fn with_adjust_exit_price<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.adjust_exit_price = Some(Box::new(f));
        self
    }

    pub fn with_adjust_position<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, f64, f64) -> HookResult<Option<f64>> + Send + Sync + 'static,
    {
        self.hooks.adjust_position = Some(Box::new(f));
        self
    }

    pub fn with_on_order_filled<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookCtx, &Order) -> HookResult<()> + Send + Sync + 'static,
    {
        self.hooks.on_order_filled = Some(Box::new(f));
        self
    }

    pub fn with_tick_started<F>(mut self, f: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> HookResult<()> + Send + Sync + 'static,
    {
        self.hooks.tick_started = Some(Box::new(f));
        self
    }

    /// Resolve the hook set, rejecting mutually exclusive combinations:
    /// the combined `adjust_order_price` cannot coexist with the split
    /// entry/exit variants.
    pub fn build(self) -> Result<StrategyHooks, ConfigError> {
        let combined = self.hooks.adjust_order_price.is_some();
        let split =
            self.hooks.adjust_entry_price.is_some() || self.hooks.adjust_exit_price.is_some();
        if combined && split {
            return Err(ConfigError::ConfigConflict(
                "adjust_order_price cannot be combined with adjust_entry_price/adjust_exit_price"
                    .into(),
            ));
        }
        Ok(self.hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, Order, OrderId, OrderSide};
    use chrono::TimeZone;

    fn candle() -> Candle {
        Candle {
            pair: "BTC/USDT".into(),
            open_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume: 1.0,
        }
    }

    fn ctx(candle: &Candle) -> HookCtx<'_> {
        HookCtx {
            pair: "BTC/USDT",
            trade: None,
            now: candle.open_time,
            candle,
            current_rate: candle.close,
        }
    }

    fn order(price: f64) -> Order {
        Order::new(
            OrderId(1),
            OrderSide::Entry,
            price,
            1.0,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            0,
        )
    }

    #[test]
    fn absent_hooks_yield_defaults() {
        let hooks = StrategyHooks::builder().build().unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        assert_eq!(hooks.stake_amount(&ctx, 100.0, 10.0, 1000.0), 100.0);
        assert_eq!(hooks.entry_price(&ctx, 100.0), 100.0);
        assert!(hooks.confirm_entry(&ctx, 100.0, 100.0));
        assert!(hooks.confirm_exit(&ctx, &ExitReason::Roi));
        assert_eq!(hooks.stoploss(&ctx, false), None);
        assert_eq!(hooks.roi(&ctx), None);
        assert_eq!(hooks.custom_exit(&ctx), None);
        assert_eq!(hooks.adjust_order_price(&ctx, &order(100.0)), PriceAdjustment::Keep);
    }

    #[test]
    fn failing_hook_falls_back_to_default() {
        let hooks = StrategyHooks::builder()
            .with_stake_amount(|_, _, _, _| Err(HookError::new("boom")))
            .with_confirm_entry(|_, _, _| Err(HookError::new("boom")))
            .build()
            .unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        assert_eq!(hooks.stake_amount(&ctx, 100.0, 10.0, 1000.0), 100.0);
        assert!(hooks.confirm_entry(&ctx, 100.0, 100.0));
    }

    #[test]
    fn conflicting_price_adjust_hooks_fail_at_build() {
        let result = StrategyHooks::builder()
            .with_adjust_order_price(|_, o| Ok(Some(o.requested_price)))
            .with_adjust_entry_price(|_, o| Ok(Some(o.requested_price)))
            .build();
        assert!(matches!(result, Err(ConfigError::ConfigConflict(_))));
    }

    #[test]
    fn split_hooks_alone_are_fine() {
        let result = StrategyHooks::builder()
            .with_adjust_entry_price(|_, o| Ok(Some(o.requested_price)))
            .with_adjust_exit_price(|_, o| Ok(Some(o.requested_price)))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn unchanged_price_normalizes_to_keep() {
        let hooks = StrategyHooks::builder()
            .with_adjust_order_price(|_, o| Ok(Some(o.requested_price)))
            .build()
            .unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        assert_eq!(hooks.adjust_order_price(&ctx, &order(100.0)), PriceAdjustment::Keep);
    }

    #[test]
    fn new_price_normalizes_to_replace_and_none_to_cancel() {
        let hooks = StrategyHooks::builder()
            .with_adjust_order_price(|_, _| Ok(Some(99.0)))
            .build()
            .unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        assert_eq!(hooks.adjust_order_price(&ctx, &order(100.0)), PriceAdjustment::Replace(99.0));

        let hooks = StrategyHooks::builder()
            .with_adjust_order_price(|_, _| Ok(None))
            .build()
            .unwrap();
        assert_eq!(hooks.adjust_order_price(&ctx, &order(100.0)), PriceAdjustment::Cancel);
    }

    #[test]
    fn split_slot_is_side_selective() {
        let hooks = StrategyHooks::builder()
            .with_adjust_entry_price(|_, _| Ok(Some(99.0)))
            .build()
            .unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        let entry = order(100.0);
        let mut exit = order(100.0);
        exit.side = OrderSide::Exit;
        assert!(hooks.has_price_adjustment(&entry));
        assert!(!hooks.has_price_adjustment(&exit));
        assert_eq!(hooks.adjust_order_price(&ctx, &exit), PriceAdjustment::Keep);
    }

    #[test]
    fn invalid_replacement_price_is_ignored() {
        let hooks = StrategyHooks::builder()
            .with_adjust_order_price(|_, _| Ok(Some(f64::NAN)))
            .build()
            .unwrap();
        let candle = candle();
        let ctx = ctx(&candle);
        assert_eq!(hooks.adjust_order_price(&ctx, &order(100.0)), PriceAdjustment::Keep);
    }
}
