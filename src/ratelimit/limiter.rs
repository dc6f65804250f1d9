//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::clock::{Clock, TokioClock};
use super::history::FireHistory;
use super::operation::Operation;
use super::tier::Constraint;
use crate::error::{Result, ThrottleError};

/// Default number of calls allowed to fire immediately after a safe start.
pub const DEFAULT_INITIAL_BURST_ALLOWANCE: u32 = 1;

/// Options controlling how a limiter's history starts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Pre-load the window as if the limiter had been running at its
    /// sustained rate
    pub safe_start: bool,
    /// Calls allowed to fire immediately after a safe start (0..=max_quota)
    pub initial_burst_allowance: u32,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            safe_start: false,
            initial_burst_allowance: DEFAULT_INITIAL_BURST_ALLOWANCE,
        }
    }
}

impl StartOptions {
    pub fn safe_start() -> Self {
        Self {
            safe_start: true,
            ..Self::default()
        }
    }
}

/// Rate limiter for one operation kind.
///
/// Enforces the burst spacing and rolling-window budget of a [`Constraint`] by
/// suspending callers of [`acquire`](Self::acquire) until their call is safe.
/// This struct is thread-safe and can be shared across multiple tasks; the
/// whole check-wait-commit sequence runs under a per-limiter lock.
#[derive(Debug)]
pub struct RateLimit {
    operation: Operation,
    constraint: Constraint,
    /// Instant that history timestamps are measured from
    origin: Instant,
    clock: Arc<dyn Clock>,
    history: Mutex<FireHistory>,
}

impl RateLimit {
    /// Create a limiter on the tokio clock.
    pub fn new(operation: Operation, constraint: Constraint, options: StartOptions) -> Result<Self> {
        Self::with_clock(operation, constraint, options, Arc::new(TokioClock))
    }

    /// Create a limiter driven by the given clock.
    pub fn with_clock(
        operation: Operation,
        constraint: Constraint,
        options: StartOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        constraint.validate()?;

        let burst_interval = 1.0 / constraint.burst_per_second;
        let history = match constraint.window() {
            None => FireHistory::burst_only(burst_interval),
            Some(window) if options.safe_start => {
                if options.initial_burst_allowance > window.quota {
                    return Err(ThrottleError::InvalidConfiguration(format!(
                        "{}: initial burst allowance {} exceeds max_quota {}",
                        operation, options.initial_burst_allowance, window.quota
                    )));
                }
                FireHistory::seeded(burst_interval, window, options.initial_burst_allowance)
            }
            Some(window) => FireHistory::windowed(burst_interval, window),
        };

        debug!(
            operation = %operation,
            burst_per_second = constraint.burst_per_second,
            max_quota = ?constraint.max_quota,
            max_window_seconds = ?constraint.max_window_seconds,
            safe_start = options.safe_start,
            "Creating rate limiter"
        );

        Ok(Self {
            operation,
            constraint,
            origin: clock.now(),
            clock,
            history: Mutex::new(history),
        })
    }

    /// Wait until firing is safe, then record the firing.
    ///
    /// Returns the delay that was applied.
    pub async fn acquire(&self) -> Duration {
        let mut history = self.history.lock().await;

        let now = self.elapsed_secs();
        let deficit = history.deficit(now);

        trace!(
            operation = %self.operation,
            deficit_secs = deficit,
            window_oldest = ?history.oldest(),
            window_len = history.len(),
            "Acquiring rate limit slot"
        );

        let delay = Duration::try_from_secs_f64(deficit).unwrap_or(Duration::MAX);
        if !delay.is_zero() {
            debug!(
                operation = %self.operation,
                delay_ms = delay.as_millis() as u64,
                "Rate limit reached, delaying call"
            );
            self.clock.sleep(delay).await;
        }

        history.commit(now + deficit);
        delay
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires.
    ///
    /// A cancelled wait records nothing.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<Duration> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(operation = %self.operation, "Rate limit wait cancelled");
                Err(ThrottleError::Cancelled(self.operation))
            }
            delay = self.acquire() => Ok(delay),
        }
    }

    /// Get the operation this limiter guards.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Get the constraint this limiter enforces.
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Number of firings currently held in the window history.
    pub async fn window_len(&self) -> usize {
        self.history.lock().await.len()
    }

    /// Time of the most recent firing, relative to when the limiter was created.
    pub async fn last_fire(&self) -> Option<Duration> {
        self.history
            .lock()
            .await
            .last_fire()
            .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
    }

    fn elapsed_secs(&self) -> f64 {
        self.clock.now().duration_since(self.origin).as_secs_f64()
    }
}
