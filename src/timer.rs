//! Repeating timers behind a trait so the backup schedule can be driven by hand in tests

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Longest period a [`TokioTimerService`] timer will wait between ticks
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Work run on every timer tick
pub type TimerTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Registers repeating work
pub trait TimerService: Send + Sync {
    /// Run `task` every `period`, first tick one full period from now.
    ///
    /// Dropping the returned handle stops the timer.
    fn every(&self, period: Duration, task: TimerTask) -> TimerHandle;
}

/// Keeps a registered timer alive; cancels it when dropped
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop the timer now
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Timer service backed by `tokio::time::interval`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimerService;

impl TimerService for TokioTimerService {
    fn every(&self, period: Duration, task: TimerTask) -> TimerHandle {
        let handle = Self::spawn_ticker(period, task);
        TimerHandle::new(move || handle.abort())
    }
}

impl TokioTimerService {
    /// Period actually used for a requested one: zero and oversized periods are clamped
    fn effective_period(requested: Duration) -> Duration {
        requested.clamp(Duration::from_millis(1), MAX_TIMER_PERIOD)
    }

    fn spawn_ticker(requested: Duration, task: TimerTask) -> JoinHandle<()> {
        let period = Self::effective_period(requested);
        if period != requested {
            warn!(
                requested_secs = requested.as_secs(),
                period_secs = period.as_secs(),
                "Timer period out of range, clamping"
            );
        }
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or_else(|| {
            warn!(period_secs = period.as_secs(), "First tick out of range, starting now");
            now
        });

        tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!(period_secs = period.as_secs(), "Timer tick");
                // ticks never wait for the previous run
                tokio::spawn((task)());
            }
        })
    }
}
