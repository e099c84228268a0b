use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Fixed-rate ticker anchored to the run start.
///
/// Deadlines are `start + n * interval`, so a slow tick never pushes the
/// following ones back.
pub(crate) struct Timer {
    interval: Interval,
    interval_dur: Duration,
}

impl Timer {
    /// NOTE: The first tick completes at `start`.
    pub fn new(start: Instant, interval_dur: Duration) -> Self {
        let mut interval = interval_at(start, interval_dur);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            interval_dur,
        }
    }

    /// Waits for the next deadline and returns it.
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.interval_dur))
    }
}
