// Periodic timer shared by the sources and the scheduler.
//
// Backed by tokio's interval, so tests drive it with paused virtual time.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct Pacer {
    interval: Interval,
    period: Duration,
}

impl Pacer {
    /// Ticks stay aligned to the original schedule; late ticks fire back to back.
    /// The scheduler uses this so demand keeps its aggregate rate.
    pub fn fixed_rate(period: Duration) -> Self {
        Self::with_behavior(period, MissedTickBehavior::Burst)
    }

    /// A late tick pushes the following ones back by a full period.
    /// Sources use this: after a blocked put they wait the whole interval again.
    pub fn fixed_delay(period: Duration) -> Self {
        Self::with_behavior(period, MissedTickBehavior::Delay)
    }

    fn with_behavior(period: Duration, behavior: MissedTickBehavior) -> Self {
        let period = period.max(MIN_PERIOD);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(behavior);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The first tick completes immediately
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Wait for the next tick. `None` once `token` is cancelled; cancellation wins ties.
    pub async fn tick_or_cancel(&mut self, token: &CancellationToken) -> Option<Instant> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            instant = self.interval.tick() => Some(instant),
        }
    }
}
