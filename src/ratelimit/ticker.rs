//! Time source for bandwidth decisions.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bandwidth::micros;

/// Port for reading elapsed time and waiting.
///
/// Bandwidth state is expressed in microseconds elapsed since the ticker's
/// origin. Limiters call [`sleep`](Ticker::sleep) outside any lock when a
/// reservation requires waiting.
pub trait Ticker: Send + Sync + Debug {
    /// Microseconds elapsed since this ticker's origin.
    fn elapsed_micros(&self) -> u64;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Ticker backed by `Instant::now()`.
#[derive(Debug, Clone, Copy)]
pub struct SystemTicker {
    origin: Instant,
}

impl SystemTicker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for SystemTicker {
    fn elapsed_micros(&self) -> u64 {
        micros(self.origin.elapsed())
    }
}

/// Manually driven ticker for tests.
///
/// Clones share the same time. Sleeping advances the clock instead of
/// blocking, so waits computed by bandwidths are observable and instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    micros: Arc<AtomicU64>,
    slept: Arc<AtomicU64>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `duration`, saturating at `u64::MAX` micros.
    pub fn advance(&self, duration: Duration) {
        saturating_add(&self.micros, micros(duration));
    }

    /// Total time spent in `sleep` so far.
    pub fn total_slept(&self) -> Duration {
        Duration::from_micros(self.slept.load(Ordering::SeqCst))
    }
}

impl Ticker for ManualTicker {
    fn elapsed_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        saturating_add(&self.slept, micros(duration));
        self.advance(duration);
    }
}

fn saturating_add(counter: &AtomicU64, delta: u64) {
    // The closure never returns None, so the update cannot fail
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_add(delta))
    });
}
