//! Backtest driver — replays a candle feed through the scheduler.

use crate::engine::scheduler::Scheduler;
use crate::exchange::ExchangeClient;
use crate::feed::CandleFeed;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub ticks: usize,
    pub trades_closed: usize,
    pub trades_open: usize,
    /// Sum of realized profit over closed trades, in quote currency.
    pub total_profit: f64,
}

/// Replay the feed to exhaustion. Each batch is processed at the bar's
/// close time, so decisions never see the bar they are deciding on as
/// still forming.
pub fn run_backtest<F, E>(feed: &mut F, scheduler: &mut Scheduler<E>) -> BacktestReport
where
    F: CandleFeed,
    E: ExchangeClient,
{
    let timeframe = chrono::Duration::seconds(scheduler.config().timeframe_secs as i64);
    let mut ticks = 0;
    while let Some(candles) = feed.next_candles() {
        let Some(open_time) = candles.values().map(|c| c.open_time).max() else { continue };
        scheduler.process_tick(open_time + timeframe, &candles);
        ticks += 1;
    }

    let total_profit = scheduler.closed_trades().iter().map(|t| t.realized_profit).sum();
    let report = BacktestReport {
        ticks,
        trades_closed: scheduler.closed_trades().len(),
        trades_open: scheduler.open_trades().len(),
        total_profit,
    };
    info!(
        ticks = report.ticks,
        trades_closed = report.trades_closed,
        trades_open = report.trades_open,
        total_profit = report.total_profit,
        "backtest finished"
    );
    report
}
