//! Firing history and delay arithmetic for a single operation.
//!
//! All functions here are pure: time is passed in explicitly as seconds
//! relative to the owning limiter's origin, which keeps the arithmetic
//! deterministic and lets synthetic history lie before the origin.

use std::collections::VecDeque;

use super::tier::Window;

/// The record of past firings needed to evaluate both constraints.
#[derive(Debug, Clone)]
pub(crate) struct FireHistory {
    /// Minimum spacing between firings in seconds
    burst_interval: f64,
    /// Most recent committed firing, synthetic history excluded
    last_fire: Option<f64>,
    /// Window budget, if any
    window: Option<Window>,
    /// Most recent firings, oldest first, at most `window.quota` long
    recent: VecDeque<f64>,
}

impl FireHistory {
    /// History for a limiter without a window budget.
    pub fn burst_only(burst_interval: f64) -> Self {
        Self {
            burst_interval,
            last_fire: None,
            window: None,
            recent: VecDeque::new(),
        }
    }

    /// Empty history for a windowed limiter.
    ///
    /// The window constraint only binds once `quota` firings are recorded, so
    /// the first `quota` calls are limited by burst spacing alone.
    pub fn windowed(burst_interval: f64, window: Window) -> Self {
        Self {
            burst_interval,
            last_fire: None,
            window: Some(window),
            recent: VecDeque::new(),
        }
    }

    /// History pre-loaded as if the limiter had been running at its
    /// sustained rate for a full window.
    ///
    /// Synthetic firings sit on a grid of `seconds / quota` spacing ending at
    /// the origin. The newest `allowance` grid points are left out, which lets
    /// that many calls fire before slot pacing takes over.
    pub fn seeded(burst_interval: f64, window: Window, allowance: u32) -> Self {
        let mut history = Self::windowed(burst_interval, window);
        let slot = window.seconds / window.quota as f64;
        let seeded = window.quota.saturating_sub(allowance);
        history
            .recent
            .extend((0..seeded).map(|i| -window.seconds + slot * (i + 1) as f64));
        history
    }

    /// Seconds to wait before firing at `now`, or zero if firing is safe.
    pub fn deficit(&self, now: f64) -> f64 {
        let burst = self
            .last_fire
            .map_or(0.0, |last| self.burst_interval - (now - last));

        let window = match (self.window, self.recent.front()) {
            (Some(window), Some(&oldest)) if self.recent.len() >= window.quota as usize => {
                window.seconds - (now - oldest)
            }
            _ => 0.0,
        };

        burst.max(window).max(0.0)
    }

    /// Record a firing at `at`, evicting the oldest entry at capacity.
    pub fn commit(&mut self, at: f64) {
        debug_assert!(self.newest().map_or(true, |newest| at >= newest));

        if let Some(window) = self.window {
            if self.recent.len() >= window.quota as usize {
                self.recent.pop_front();
            }
            self.recent.push_back(at);
        }
        self.last_fire = Some(at);
    }

    pub fn last_fire(&self) -> Option<f64> {
        self.last_fire
    }

    pub fn oldest(&self) -> Option<f64> {
        self.recent.front().copied()
    }

    pub fn newest(&self) -> Option<f64> {
        self.recent.back().copied().or(self.last_fire)
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }
}
