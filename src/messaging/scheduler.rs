use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of publish ticks, injected into the publish loop.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self) -> Instant;
}

/// Fixed-period ticker. The first tick fires one full period after creation;
/// ticks missed while a slow tick body runs are skipped rather than queued.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_a_full_period() {
        let start = Instant::now();
        let mut ticker = IntervalTicker::new(Duration::from_millis(1000));

        let first = ticker.tick().await;
        assert_eq!(first - start, Duration::from_millis(1000));

        let second = ticker.tick().await;
        assert_eq!(second - first, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_tick_skips_missed_ones() {
        let start = Instant::now();
        let mut ticker = IntervalTicker::new(Duration::from_millis(100));

        ticker.tick().await;
        time::sleep(Duration::from_millis(350)).await;

        // The late tick fires immediately, then the schedule realigns.
        ticker.tick().await;
        let realigned = ticker.tick().await;
        assert_eq!(realigned - start, Duration::from_millis(500));
    }
}
