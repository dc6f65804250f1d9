//! Time source and suspension point for rate limiters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Trait for reading monotonic time and suspending the current task.
///
/// This trait abstracts over the tokio timer and virtual clocks so the
/// limiter arithmetic can be driven deterministically in tests.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio runtime timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A virtual clock that only moves when slept on or advanced.
///
/// Sleeping completes immediately and moves the clock forward by the
/// requested duration. Every requested sleep is recorded.
///
/// This is a testing aid for client code: hand it to
/// [`RateLimiterRegistry::with_clock`](super::RateLimiterRegistry::with_clock)
/// to assert on the delays a call pattern produces without waiting for them.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use replay_throttle::ratelimit::{
///     Constraint, ManualClock, Operation, RateLimiterRegistry, StartOptions, TierConfig,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> replay_throttle::error::Result<()> {
/// let tier = TierConfig::new().with_limit(Operation::GetReplay, Constraint::burst(2.0));
/// let clock = Arc::new(ManualClock::new());
/// let registry =
///     RateLimiterRegistry::with_clock(&tier, true, StartOptions::default(), clock.clone())?;
///
/// registry.acquire(Operation::GetReplay).await?;
/// registry.acquire(Operation::GetReplay).await?;
/// assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// All sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
