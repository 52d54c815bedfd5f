//! Tick scheduler — the single-threaded decision loop.
//!
//! One `process_tick` call consumes one batch of closed candles and runs
//! every pair through the same sequence: settle fills, refresh
//! protections, manage working orders, evaluate exits, then scan for new
//! entries. All strategy influence flows through [`StrategyHooks`]; a
//! failing hook falls back to its default and the tick continues.
//!
//! Config hot reload is tick-atomic: `schedule_config_reload` stages a
//! new config and the swap happens at the next tick boundary, never
//! mid-pair.

use crate::domain::{Candle, Direction, Order, OrderId, OrderSide, Trade, TradeId};
use crate::engine::config::EngineConfig;
use crate::engine::order_manager;
use crate::exchange::{ExchangeClient, OrderRequest};
use crate::hooks::{ConfigError, HookCtx, StrategyHooks};
use crate::ledger::{self, Adjustment, AdjustmentOutcome};
use crate::pattern::{ArmingRules, PatternAccumulator, SignalState};
use crate::protection::{ExitReason, StopAdjust};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub struct Scheduler<E: ExchangeClient> {
    cfg: EngineConfig,
    hooks: StrategyHooks,
    accumulator: PatternAccumulator,
    exchange: E,
    /// At most one open trade per pair.
    trades: BTreeMap<String, Trade>,
    closed_trades: Vec<Trade>,
    /// Pair -> first bar index at which a new entry is allowed again.
    cooldown_until: BTreeMap<String, usize>,
    next_trade_id: u64,
    bar_index: usize,
    pending_config: Option<EngineConfig>,
}

impl<E: ExchangeClient> Scheduler<E> {
    pub fn new(
        cfg: EngineConfig,
        hooks: StrategyHooks,
        rules: Box<dyn ArmingRules>,
        exchange: E,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            hooks,
            accumulator: PatternAccumulator::new(rules),
            exchange,
            trades: BTreeMap::new(),
            closed_trades: Vec::new(),
            cooldown_until: BTreeMap::new(),
            next_trade_id: 0,
            bar_index: 0,
            pending_config: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn open_trades(&self) -> &BTreeMap<String, Trade> {
        &self.trades
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn pattern_state(&self, pair: &str) -> Option<&SignalState> {
        self.accumulator.state(pair)
    }

    pub fn exchange_mut(&mut self) -> &mut E {
        &mut self.exchange
    }

    /// Stage a config swap for the next tick boundary. Invalid configs
    /// are rejected here so a bad reload cannot take down a running loop.
    pub fn schedule_config_reload(&mut self, cfg: EngineConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        self.pending_config = Some(cfg);
        Ok(())
    }

    /// Consume one batch of closed candles.
    pub fn process_tick(&mut self, now: DateTime<Utc>, candles: &BTreeMap<String, Candle>) {
        if let Some(cfg) = self.pending_config.take() {
            info!("applying reloaded configuration");
            self.cfg = cfg;
        }
        self.exchange.on_tick(now, candles);
        self.hooks.tick_started(now);
        let bar = self.bar_index;

        // Open trades first, so exits free capacity before entries run.
        let open_pairs: Vec<String> = self.trades.keys().cloned().collect();
        for pair in open_pairs {
            let Some(candle) = candles.get(&pair) else { continue };
            let Some(mut trade) = self.trades.remove(&pair) else { continue };
            self.manage_trade(&mut trade, candle, now, bar);

            if !trade.is_open && !trade.has_active_orders() {
                self.cooldown_until.insert(pair.clone(), bar + 1 + self.cfg.cooldown_bars);
                self.closed_trades.push(trade);
            } else if !trade.has_position() && !trade.has_active_orders() {
                // Entry canceled before any fill: the trade never engaged.
                debug!(pair = %pair, trade_id = trade.id.0, "trade abandoned before first fill");
                trade.is_open = false;
                trade.close_date = Some(now);
                self.closed_trades.push(trade);
            } else {
                self.trades.insert(pair, trade);
            }
        }

        // Pattern accumulation + entry scan.
        for (pair, candle) in candles {
            let signal = {
                let state = self.accumulator.update(pair, candle);
                if state.motif_detected { state.motif_direction } else { None }
            };
            if let Some(direction) = signal {
                self.try_enter(pair, candle, direction, now, bar);
            }
        }

        self.bar_index += 1;
    }

    // ── Entry ──────────────────────────────────────────────────────────

    fn try_enter(
        &mut self,
        pair: &str,
        candle: &Candle,
        direction: Direction,
        now: DateTime<Utc>,
        bar: usize,
    ) {
        if self.trades.contains_key(pair) {
            return;
        }
        if let Some(&until) = self.cooldown_until.get(pair) {
            if bar < until {
                debug!(pair, until, "entry suppressed by cooldown");
                return;
            }
        }
        if self.trades.len() >= self.cfg.max_open_trades {
            debug!(pair, "entry suppressed, at max open trades");
            return;
        }
        if direction == Direction::Short && !self.cfg.allow_shorts {
            debug!(pair, "short signal ignored, shorts disabled");
            return;
        }

        let ctx = HookCtx { pair, trade: None, now, candle, current_rate: candle.close };

        let mut leverage = self.hooks.leverage(&ctx, self.cfg.default_leverage);
        if !leverage.is_finite() || leverage < 1.0 {
            warn!(pair, leverage, "invalid leverage from hook, using default");
            leverage = self.cfg.default_leverage;
        }

        let mut stake =
            self.hooks.stake_amount(&ctx, self.cfg.stake_amount, self.cfg.min_stake, self.cfg.max_stake);
        if !stake.is_finite() {
            stake = self.cfg.stake_amount;
        }
        let clamped = stake.clamp(self.cfg.min_stake, self.cfg.max_stake);
        if (clamped - stake).abs() > f64::EPSILON {
            info!(pair, requested = stake, clamped, "initial stake clamped to bounds");
        }
        let stake = clamped;

        let mut price = self.hooks.entry_price(&ctx, candle.close);
        if !price.is_finite() || price <= 0.0 {
            price = candle.close;
        }
        let distance = self.cfg.max_entry_price_distance_ratio;
        let lo = candle.close * (1.0 - distance);
        let hi = candle.close * (1.0 + distance);
        let bounded = price.clamp(lo, hi);
        if (bounded - price).abs() > f64::EPSILON {
            info!(pair, requested = price, bounded, "entry price clamped to distance bound");
        }
        let price = bounded;

        if !self.hooks.confirm_entry(&ctx, price, stake) {
            debug!(pair, "entry vetoed by confirmation hook");
            return;
        }

        let amount = stake * leverage / price;
        let request = OrderRequest {
            pair: pair.to_string(),
            side: OrderSide::Entry,
            direction,
            price,
            amount,
        };
        let order_id = match self.exchange.place(&request) {
            Ok(id) => id,
            Err(e) => {
                warn!(pair, error = %e, "entry order placement failed");
                return;
            }
        };

        self.next_trade_id += 1;
        let mut trade =
            Trade::new(TradeId(self.next_trade_id), pair, direction, leverage, now, self.cfg.stoploss);
        trade.orders.push(Order::new(order_id, OrderSide::Entry, price, amount, now, bar));
        info!(
            pair,
            trade_id = trade.id.0,
            direction = ?direction,
            price,
            amount,
            stake,
            leverage,
            "entry order placed"
        );
        self.trades.insert(pair.to_string(), trade);
    }

    // ── Open-trade management ──────────────────────────────────────────

    fn manage_trade(&mut self, trade: &mut Trade, candle: &Candle, now: DateTime<Utc>, bar: usize) {
        let fills = order_manager::settle_fills(&mut self.exchange, trade, now);
        self.dispatch_fill_events(trade, candle, now, &fills);
        if !trade.is_open {
            // A full exit can settle while an adjustment order is still
            // working; nothing further belongs at the exchange.
            order_manager::cancel_remaining_orders(&mut self.exchange, trade);
            return;
        }

        if trade.has_position() {
            self.refresh_protections(trade, candle, now);
        }

        order_manager::manage_open_orders(
            &mut self.exchange,
            &self.cfg,
            &self.hooks,
            trade,
            candle,
            now,
            bar,
        );

        if trade.has_position() && !trade.has_active_orders() {
            self.apply_position_adjustment(trade, candle, now, bar);
        }

        if trade.has_position() && !trade.has_active_exit_order() {
            if let Some(reason) = self.resolve_exit(trade, candle, now) {
                self.place_exit(trade, candle, now, bar, reason);
            }
        }
    }

    fn dispatch_fill_events(
        &mut self,
        trade: &mut Trade,
        candle: &Candle,
        now: DateTime<Utc>,
        fills: &[OrderId],
    ) {
        for &id in fills {
            let Some(order) = trade.order(id).cloned() else { continue };
            let ctx = hook_ctx(trade, candle, now);
            self.hooks.order_filled(&ctx, &order);
        }
        // One post-fill stop refresh per tick with fills: the reference
        // price may have moved under an averaging adjustment.
        if !fills.is_empty() && trade.has_position() {
            let proposal = {
                let ctx = hook_ctx(trade, candle, now);
                self.hooks.stoploss(&ctx, true)
            };
            if let Some(ratio) = proposal {
                trade.stoploss.adjust(trade.direction, candle.close, ratio, StopAdjust::PostFill);
            }
        }
    }

    /// Per-tick stop maintenance: high-water mark, config trailing, then
    /// the strategy's stop proposal through the ratchet.
    fn refresh_protections(&mut self, trade: &mut Trade, candle: &Candle, now: DateTime<Utc>) {
        trade.stoploss.observe(trade.direction, candle.close);

        if let Some(trailing) = &self.cfg.trailing {
            let profit = trade.current_profit_ratio(candle.close);
            if profit >= trailing.positive_offset {
                trade.stoploss.adjust(
                    trade.direction,
                    candle.close,
                    -trailing.positive_ratio,
                    StopAdjust::Trailing,
                );
            } else if !trailing.only_offset_is_reached {
                // Below the offset the stop trails at the configured
                // floor distance instead.
                let floor = trade.stoploss.initial_stop_ratio;
                trade.stoploss.adjust(trade.direction, candle.close, floor, StopAdjust::Trailing);
            }
        }

        let proposal = {
            let ctx = hook_ctx(trade, candle, now);
            self.hooks.stoploss(&ctx, false)
        };
        if let Some(ratio) = proposal {
            let applied =
                trade.stoploss.adjust(trade.direction, candle.close, ratio, StopAdjust::Ratchet);
            if !applied {
                warn!(
                    pair = %trade.pair,
                    trade_id = trade.id.0,
                    proposed = ratio,
                    current = ?trade.stoploss.stop_price,
                    "stoploss proposal rejected, would loosen the stop"
                );
            }
        }
    }

    /// Evaluate exit conditions in priority order. A vetoed reason does
    /// not shadow lower-priority reasons.
    fn resolve_exit(
        &self,
        trade: &Trade,
        candle: &Candle,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        let ctx = hook_ctx(trade, candle, now);

        if let Some(tag) = self.hooks.custom_exit(&ctx) {
            let reason = ExitReason::CustomExit(tag);
            if self.hooks.confirm_exit(&ctx, &reason) {
                return Some(reason);
            }
            debug!(pair = %trade.pair, %reason, "exit vetoed by confirmation hook");
        }

        if trade.stoploss.is_breached(trade.direction, candle.low, candle.high) {
            let reason = if trade.stoploss.is_trailed() {
                ExitReason::TrailingStop
            } else {
                ExitReason::Stoploss
            };
            if self.hooks.confirm_exit(&ctx, &reason) {
                return Some(reason);
            }
            // Overriding a breached stop is a configuration hazard, not
            // routine strategy behavior.
            warn!(pair = %trade.pair, %reason, "stop breach exit vetoed by confirmation hook");
        }

        let elapsed = trade.elapsed(now).num_seconds();
        let threshold = self.cfg.roi.effective_threshold(elapsed, self.hooks.roi(&ctx));
        if let Some(threshold) = threshold {
            if trade.current_profit_ratio(candle.close) >= threshold {
                let reason = ExitReason::Roi;
                if self.hooks.confirm_exit(&ctx, &reason) {
                    return Some(reason);
                }
                debug!(pair = %trade.pair, %reason, "exit vetoed by confirmation hook");
            }
        }
        None
    }

    fn place_exit(
        &mut self,
        trade: &mut Trade,
        candle: &Candle,
        now: DateTime<Utc>,
        bar: usize,
        reason: ExitReason,
    ) {
        let mut price = {
            let ctx = hook_ctx(trade, candle, now);
            self.hooks.exit_price(&ctx, candle.close)
        };
        if !price.is_finite() || price <= 0.0 {
            price = candle.close;
        }
        let amount = trade.amount;
        let request = OrderRequest {
            pair: trade.pair.clone(),
            side: OrderSide::Exit,
            direction: trade.direction,
            price,
            amount,
        };
        match self.exchange.place(&request) {
            Ok(id) => {
                trade.orders.push(Order::new(id, OrderSide::Exit, price, amount, now, bar));
                info!(
                    pair = %trade.pair,
                    trade_id = trade.id.0,
                    %reason,
                    price,
                    amount,
                    "exit order placed"
                );
                trade.exit_reason = Some(reason);
            }
            Err(e) => {
                warn!(pair = %trade.pair, error = %e, "exit order placement failed, will retry");
            }
        }
    }

    fn apply_position_adjustment(
        &mut self,
        trade: &mut Trade,
        candle: &Candle,
        now: DateTime<Utc>,
        bar: usize,
    ) {
        let delta = {
            let ctx = hook_ctx(trade, candle, now);
            self.hooks.adjust_position(&ctx, self.cfg.min_stake, self.cfg.max_stake)
        };
        let Some(delta) = delta else { return };

        match ledger::propose_adjustment(
            trade,
            delta,
            candle.close,
            self.cfg.min_stake,
            self.cfg.max_stake,
        ) {
            AdjustmentOutcome::Rejected(reason) => {
                debug!(pair = %trade.pair, delta, reason = %reason, "position adjustment rejected");
            }
            AdjustmentOutcome::Accepted(Adjustment::Enter { stake, amount }) => {
                let request = OrderRequest {
                    pair: trade.pair.clone(),
                    side: OrderSide::Entry,
                    direction: trade.direction,
                    price: candle.close,
                    amount,
                };
                match self.exchange.place(&request) {
                    Ok(id) => {
                        trade
                            .orders
                            .push(Order::new(id, OrderSide::Entry, candle.close, amount, now, bar));
                        info!(
                            pair = %trade.pair,
                            trade_id = trade.id.0,
                            stake,
                            amount,
                            "position increase order placed"
                        );
                    }
                    Err(e) => warn!(pair = %trade.pair, error = %e, "adjustment placement failed"),
                }
            }
            AdjustmentOutcome::Accepted(Adjustment::Exit { amount }) => {
                let request = OrderRequest {
                    pair: trade.pair.clone(),
                    side: OrderSide::Exit,
                    direction: trade.direction,
                    price: candle.close,
                    amount,
                };
                match self.exchange.place(&request) {
                    Ok(id) => {
                        trade
                            .orders
                            .push(Order::new(id, OrderSide::Exit, candle.close, amount, now, bar));
                        info!(
                            pair = %trade.pair,
                            trade_id = trade.id.0,
                            amount,
                            "position reduction order placed"
                        );
                    }
                    Err(e) => warn!(pair = %trade.pair, error = %e, "adjustment placement failed"),
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SimulatedExchange;
    use crate::protection::{RoiStep, RoiTable};
    use chrono::{Duration, TimeZone};

    /// Arms on a close above 100, resets on a close below 90.
    struct ThresholdRules;

    impl ArmingRules for ThresholdRules {
        fn arm(&self, history: &[Candle]) -> bool {
            history.last().map(|c| c.close > 100.0).unwrap_or(false)
        }
        fn reset(&self, history: &[Candle]) -> bool {
            history.last().map(|c| c.close < 90.0).unwrap_or(false)
        }
    }

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            pair: "BTC/USDT".into(),
            open_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn batch(c: Candle) -> BTreeMap<String, Candle> {
        let mut map = BTreeMap::new();
        map.insert(c.pair.clone(), c);
        map
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            stake_amount: 100.0,
            min_stake: 10.0,
            max_stake: 1000.0,
            stoploss: -0.05,
            roi: RoiTable::new(vec![RoiStep { after_secs: 0, ratio: 0.10 }]),
            cooldown_bars: 2,
            ..EngineConfig::default()
        }
    }

    fn scheduler(cfg: EngineConfig, hooks: StrategyHooks) -> Scheduler<SimulatedExchange> {
        Scheduler::new(cfg, hooks, Box::new(ThresholdRules), SimulatedExchange::new()).unwrap()
    }

    /// Bar shapes that arm the rules (close above 100) and then confirm
    /// three structure lines whose middle sits strictly lowest: a long
    /// motif on the last bar.
    fn signal_bars(start: i64) -> [Candle; 5] {
        [
            candle(start, 101.0, 102.0, 100.0, 101.5),
            candle(start + 1, 101.0, 103.0, 98.0, 101.0),
            candle(start + 2, 97.0, 99.0, 94.0, 98.0),
            candle(start + 3, 101.0, 105.0, 100.0, 104.0),
            candle(start + 4, 104.0, 108.0, 103.0, 107.0),
        ]
    }

    /// Drive the entry signal and return the minute of the last bar.
    fn drive_entry_signal(sched: &mut Scheduler<SimulatedExchange>) -> i64 {
        for c in signal_bars(0) {
            sched.process_tick(c.open_time, &batch(c));
        }
        4
    }

    /// A bar that trades through a 107 entry limit without touching the
    /// 101.65 initial stop.
    fn fill_candle(minute: i64) -> Candle {
        candle(minute, 107.0, 108.0, 106.9, 107.0)
    }

    #[test]
    fn motif_signal_opens_an_entry_order() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        drive_entry_signal(&mut sched);
        let trade = sched.open_trades().get("BTC/USDT").expect("trade created");
        assert!(trade.is_open);
        assert!(!trade.has_position()); // still waiting for the fill
        assert_eq!(trade.orders.len(), 1);
        assert_eq!(trade.orders[0].side, OrderSide::Entry);
    }

    #[test]
    fn entry_fill_engages_the_position() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        let m = drive_entry_signal(&mut sched);
        // Next tick trades through the limit price.
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c));
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_position());
        assert!((trade.open_rate - 107.0).abs() < 1e-9);
        assert!(trade.stoploss.stop_price.is_some());
    }

    #[test]
    fn confirm_entry_veto_blocks_the_order() {
        let hooks = StrategyHooks::builder()
            .with_confirm_entry(|_, _, _| Ok(false))
            .build()
            .unwrap();
        let mut sched = scheduler(test_config(), hooks);
        drive_entry_signal(&mut sched);
        assert!(sched.open_trades().is_empty());
    }

    #[test]
    fn roi_exit_places_exit_order_and_closes() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c)); // entry fills

        // +10% over the 107 open rate triggers the 0.10 ROI step.
        let c = candle(m + 2, 118.0, 119.0, 117.5, 118.0);
        sched.process_tick(c.open_time, &batch(c)); // exit order placed
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_active_exit_order());

        let c = candle(m + 3, 118.0, 119.0, 117.5, 118.0);
        sched.process_tick(c.open_time, &batch(c)); // exit fills
        assert!(sched.open_trades().is_empty());
        let closed = sched.closed_trades();
        assert_eq!(closed.len(), 1);
        assert!(!closed[0].is_open);
        assert!(closed[0].realized_profit > 0.0);
    }

    #[test]
    fn stoploss_breach_exits_at_a_loss() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c)); // entry fills at 107

        // Stop is 107 * 0.95 = 101.65; low pierces it.
        let c = candle(m + 2, 102.0, 103.0, 101.0, 101.2);
        sched.process_tick(c.open_time, &batch(c));
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_active_exit_order());

        let c = candle(m + 3, 101.0, 102.0, 100.0, 101.0);
        sched.process_tick(c.open_time, &batch(c));
        assert_eq!(sched.closed_trades().len(), 1);
        assert!(sched.closed_trades()[0].realized_profit < 0.0);
    }

    #[test]
    fn cooldown_blocks_reentry_after_close() {
        let hooks = StrategyHooks::builder()
            .with_custom_exit(|_| Ok(Some("take".into())))
            .build()
            .unwrap();
        let mut cfg = test_config();
        cfg.cooldown_bars = 10;
        let mut sched = scheduler(cfg, hooks);
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c)); // entry fills, exit placed
        let c = candle(m + 2, 107.0, 108.0, 106.0, 107.0);
        sched.process_tick(c.open_time, &batch(c)); // exit fills
        assert_eq!(sched.closed_trades().len(), 1);

        // Reset, rearm, and fire a fresh motif while the cooldown is
        // still running: the signal must not reopen a trade.
        let reset = candle(m + 3, 89.0, 95.0, 85.0, 88.0);
        sched.process_tick(reset.open_time, &batch(reset));
        for c in signal_bars(m + 4) {
            sched.process_tick(c.open_time, &batch(c));
        }
        assert!(sched.pattern_state("BTC/USDT").unwrap().motif_detected);
        assert!(sched.open_trades().is_empty());
    }

    #[test]
    fn custom_exit_reason_carries_the_tag() {
        let hooks = StrategyHooks::builder()
            .with_custom_exit(|_| Ok(Some("overheated".into())))
            .with_confirm_exit(|_, reason| {
                Ok(matches!(reason, ExitReason::CustomExit(tag) if tag == "overheated"))
            })
            .build()
            .unwrap();
        let mut sched = scheduler(test_config(), hooks);
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c));
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_active_exit_order());
    }

    #[test]
    fn vetoed_stoploss_still_allows_roi_exit() {
        // Veto stoploss exits only; the same tick qualifies for ROI.
        let hooks = StrategyHooks::builder()
            .with_confirm_exit(|_, reason| Ok(!matches!(reason, ExitReason::Stoploss)))
            .build()
            .unwrap();
        let mut cfg = test_config();
        cfg.roi = RoiTable::new(vec![RoiStep { after_secs: 0, ratio: 0.05 }]);
        let mut sched = scheduler(cfg, hooks);
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c)); // fills at 107

        // Low breaches the stop, but the close is +5.5% so ROI fires
        // after the stoploss veto.
        let c = candle(m + 2, 113.0, 114.0, 101.0, 112.9);
        sched.process_tick(c.open_time, &batch(c));
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_active_exit_order());
    }

    #[test]
    fn full_exit_with_working_adjustment_cancels_and_archives() {
        // Add 100 of stake while only the original entry exists. The
        // adjustment limit sits at 107 and the market never comes back,
        // so the order is still working when the ROI exit fills.
        let hooks = StrategyHooks::builder()
            .with_adjust_position(|ctx, _, _| {
                Ok(ctx.trade.filter(|t| t.orders.len() == 1).map(|_| 100.0))
            })
            .build()
            .unwrap();
        let mut sched = scheduler(test_config(), hooks);
        let m = drive_entry_signal(&mut sched);
        let c = fill_candle(m + 1);
        sched.process_tick(c.open_time, &batch(c)); // entry fills, adjustment placed at 107

        // +10% over the 107 open rate: ROI exit placed at 118 while the
        // adjustment entry stays unfilled (low never reaches 107).
        let c = candle(m + 2, 118.0, 119.0, 117.5, 118.0);
        sched.process_tick(c.open_time, &batch(c));
        let trade = sched.open_trades().get("BTC/USDT").unwrap();
        assert!(trade.has_active_exit_order());
        assert_eq!(trade.orders.len(), 3);

        // Exit fill closes the position; the leftover adjustment order
        // must be canceled the same tick and the trade archived.
        let c = candle(m + 3, 118.0, 119.0, 117.5, 118.0);
        sched.process_tick(c.open_time, &batch(c));
        assert!(sched.open_trades().is_empty());
        let closed = sched.closed_trades();
        assert_eq!(closed.len(), 1);
        assert!(!closed[0].is_open);
        assert!(closed[0].orders.iter().all(|o| o.is_terminal()));
        assert!(closed[0]
            .orders
            .iter()
            .any(|o| o.side == OrderSide::Entry && o.status == crate::domain::OrderStatus::Canceled));
    }

    /// Inverted shape: middle structure line strictly above both
    /// neighbours, a short motif on the last bar.
    fn short_signal_bars() -> [Candle; 5] {
        [
            candle(0, 101.0, 102.0, 100.0, 101.5),
            candle(1, 101.0, 103.0, 98.0, 101.0),
            candle(2, 104.0, 108.0, 103.0, 107.0),
            candle(3, 104.0, 105.0, 100.0, 104.0),
            candle(4, 107.0, 109.0, 106.0, 108.0),
        ]
    }

    #[test]
    fn short_signal_requires_opt_in() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        for c in short_signal_bars() {
            sched.process_tick(c.open_time, &batch(c));
        }
        assert!(sched.pattern_state("BTC/USDT").unwrap().motif_detected);
        assert!(sched.open_trades().is_empty());

        let mut cfg = test_config();
        cfg.allow_shorts = true;
        let mut sched = scheduler(cfg, StrategyHooks::builder().build().unwrap());
        for c in short_signal_bars() {
            sched.process_tick(c.open_time, &batch(c));
        }
        let trade = sched.open_trades().get("BTC/USDT").expect("short trade created");
        assert_eq!(trade.direction, Direction::Short);
    }

    #[test]
    fn config_reload_applies_at_tick_boundary() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        let mut cfg = test_config();
        cfg.max_open_trades = 7;
        sched.schedule_config_reload(cfg).unwrap();
        assert_eq!(sched.config().max_open_trades, 3);
        let c = candle(0, 95.0, 96.0, 94.0, 95.0);
        sched.process_tick(c.open_time, &batch(c));
        assert_eq!(sched.config().max_open_trades, 7);
    }

    #[test]
    fn invalid_reload_is_rejected_up_front() {
        let mut sched = scheduler(test_config(), StrategyHooks::builder().build().unwrap());
        let mut cfg = test_config();
        cfg.stoploss = 0.5;
        assert!(sched.schedule_config_reload(cfg).is_err());
    }

    #[test]
    fn max_open_trades_caps_entries() {
        let mut cfg = test_config();
        cfg.max_open_trades = 1;
        let mut sched = scheduler(cfg, StrategyHooks::builder().build().unwrap());

        // Two pairs, both signalling through the same bar sequence.
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let shapes = [
            (101.0, 102.0, 100.0, 101.5),
            (101.0, 103.0, 98.0, 101.0),
            (97.0, 99.0, 94.0, 98.0),
            (101.0, 105.0, 100.0, 104.0),
            (104.0, 108.0, 103.0, 107.0),
        ];
        for (i, (open, high, low, close)) in shapes.iter().enumerate() {
            let mut map = BTreeMap::new();
            for pair in ["AAA/USDT", "BBB/USDT"] {
                map.insert(
                    pair.to_string(),
                    Candle {
                        pair: pair.to_string(),
                        open_time: base + Duration::minutes(i as i64),
                        open: *open,
                        high: *high,
                        low: *low,
                        close: *close,
                        volume: 1.0,
                    },
                );
            }
            sched.process_tick(base + Duration::minutes(i as i64), &map);
        }
        assert_eq!(sched.open_trades().len(), 1);
    }
}
