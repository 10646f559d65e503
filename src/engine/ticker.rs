use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Longest accepted period, roughly thirty years.
const MAX_PERIOD: Duration = Duration::from_secs(86400 * 365 * 30);

/// A cancellable periodic timer.
///
/// The first tick fires one full period after `start`, not immediately. Missed ticks are
/// delayed rather than fired in a burst, so a slow consumer never sees two ticks back to
/// back. Cancelling drops the underlying interval; later cancels are no-ops.
pub(crate) struct Ticker {
    label: &'static str,
    interval: Option<Interval>,
}

impl Ticker {
    pub(crate) fn start(label: &'static str, period: Duration) -> Self {
        // tokio panics on a zero period, and on a deadline past the end of `Instant`
        let period = period.clamp(Duration::from_millis(1), MAX_PERIOD);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::trace!(label, ?period, "ticker started");
        Self {
            label,
            interval: Some(interval),
        }
    }

    /// Wait for the next tick. Returns `false` once the ticker has been cancelled.
    pub(crate) async fn tick(&mut self) -> bool {
        match self.interval.as_mut() {
            Some(i) => {
                i.tick().await;
                true
            }
            None => false,
        }
    }

    /// Stop the ticker. Returns `true` only for the call that actually cancelled it.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.interval.take().is_some() {
            tracing::trace!(label = self.label, "ticker cancelled");
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.interval.is_some()
    }
}
