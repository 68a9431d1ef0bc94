//! All-or-nothing fixed window bandwidth.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::micros;

/// A counter of remaining permits for the current window.
///
/// When the window elapses the counter resets to the full permit count.
/// A request that would drive the counter negative is rejected outright;
/// this variant never waits and never consumes partially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindow {
    /// Permits granted per window
    permits: u64,
    /// Window length in microseconds
    window_micros: u64,
    /// Permits left in the current window
    remaining: u64,
    /// When the current window started
    window_start: u64,
}

impl FixedWindow {
    /// Create a fixed window counter starting at `now_micros`.
    pub fn new(permits: u64, duration: Duration, now_micros: u64) -> Self {
        Self {
            permits,
            window_micros: micros(duration).max(1),
            remaining: permits,
            window_start: now_micros,
        }
    }

    /// Consume `permits` if the current window still holds them.
    pub fn try_reserve(&mut self, permits: u64, now_micros: u64) -> Option<u64> {
        self.maybe_reset_window(now_micros);

        if permits > self.remaining {
            return None;
        }
        self.remaining -= permits;
        Some(0)
    }

    /// Permits left in the window that contains `now_micros`.
    pub fn remaining(&self, now_micros: u64) -> u64 {
        if self.window_elapsed(now_micros) {
            self.permits
        } else {
            self.remaining
        }
    }

    /// The earliest instant at which at least one permit is left.
    pub fn query_earliest_available(&self, now_micros: u64) -> u64 {
        if self.remaining(now_micros) > 0 {
            now_micros
        } else {
            self.window_start + self.window_micros
        }
    }

    pub fn permits_per_second(&self) -> f64 {
        self.permits as f64 * 1_000_000.0 / self.window_micros as f64
    }

    fn window_elapsed(&self, now_micros: u64) -> bool {
        now_micros.saturating_sub(self.window_start) >= self.window_micros
    }

    /// Reset the window if it has expired, keeping window boundaries aligned.
    fn maybe_reset_window(&mut self, now_micros: u64) {
        if self.window_elapsed(now_micros) {
            let elapsed = now_micros - self.window_start;
            self.window_start = now_micros - elapsed % self.window_micros;
            self.remaining = self.permits;
        }
    }
}
