//! Live loop — wall-clock tick pacing around the scheduler.
//!
//! The loop polls the feed, processes whatever arrived, and sleeps out
//! the remainder of the tick interval. Slow ticks are never compounded:
//! if processing overruns the interval the next poll starts immediately.

use crate::engine::scheduler::Scheduler;
use crate::exchange::ExchangeClient;
use crate::feed::CandleFeed;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Fixed-interval pacing helper.
pub struct Throttler {
    interval: Duration,
}

impl Throttler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Time left in the current tick after `elapsed` of work.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }

    /// Sleep out the rest of the tick that started at `started`.
    pub fn pause(&self, started: Instant) {
        let remaining = self.remaining(started.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Run the scheduler against a live feed until `stop` is raised.
pub fn run_live<E, F>(scheduler: &mut Scheduler<E>, feed: &mut F, stop: &AtomicBool)
where
    E: ExchangeClient,
    F: CandleFeed,
{
    let throttler = Throttler::new(Duration::from_secs(scheduler.config().tick_interval_secs));
    info!(
        tick_interval_secs = scheduler.config().tick_interval_secs,
        "live loop started"
    );
    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        if let Some(candles) = feed.next_candles() {
            scheduler.process_tick(Utc::now(), &candles);
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
        throttler.pause(started);
    }
    info!("live loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::EngineConfig;
    use crate::exchange::SimulatedExchange;
    use crate::feed::VecFeed;
    use crate::hooks::StrategyHooks;
    use crate::pattern::ArmingRules;

    struct NeverRules;

    impl ArmingRules for NeverRules {
        fn arm(&self, _: &[crate::domain::Candle]) -> bool {
            false
        }
        fn reset(&self, _: &[crate::domain::Candle]) -> bool {
            false
        }
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let throttler = Throttler::new(Duration::from_secs(5));
        assert_eq!(throttler.remaining(Duration::from_secs(2)), Duration::from_secs(3));
        assert_eq!(throttler.remaining(Duration::from_secs(9)), Duration::ZERO);
    }

    #[test]
    fn raised_stop_flag_exits_immediately() {
        let mut sched = Scheduler::new(
            EngineConfig::default(),
            StrategyHooks::builder().build().unwrap(),
            Box::new(NeverRules),
            SimulatedExchange::new(),
        )
        .unwrap();
        let mut feed = VecFeed::single("BTC/USDT", Vec::new());
        let stop = AtomicBool::new(true);
        run_live(&mut sched, &mut feed, &stop);
    }
}
