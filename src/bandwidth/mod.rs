//! Bandwidths: the live admission state behind each rate.
//!
//! A [`Bandwidth`] decides for a single quota whether N permits may be
//! granted now, waiting at most a given timeout. A [`Bandwidths`] combines
//! one bandwidth per configured rate with an [`Operator`](crate::rate::Operator).
//!
//! Time is passed in explicitly as microseconds elapsed on a
//! [`Ticker`](crate::ratelimit::Ticker). Bandwidths never sleep; they return
//! the wait the caller owes.

mod bandwidths;
mod factory;
mod fixed_window;
mod smooth;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use bandwidths::Bandwidths;
pub use factory::{BandwidthFactory, CustomConstructor};
pub use fixed_window::FixedWindow;
pub use smooth::SmoothBandwidth;

/// Admission algorithm supplied by the embedding application.
///
/// Registered by name with a [`BandwidthFactory`] and selected through
/// [`Algorithm::Custom`](crate::rate::Algorithm::Custom). Custom state is
/// cloned along with the composite but is not serialized, so it can only
/// live in process-local stores.
pub trait CustomBandwidth: Send + Sync + fmt::Debug {
    /// Reserve `permits` if possible within `timeout_micros`, returning the
    /// wait in microseconds, or `None` to reject.
    fn try_reserve(&mut self, permits: u64, timeout_micros: u64, now_micros: u64) -> Option<u64>;

    /// Earliest instant at which a reservation may start.
    fn query_earliest_available(&self, now_micros: u64) -> u64;

    fn permits_per_second(&self) -> f64;

    fn clone_box(&self) -> Box<dyn CustomBandwidth>;
}

impl Clone for Box<dyn CustomBandwidth> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Whole microseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// A single quota's admission state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// All-or-nothing fixed window
    FixedWindow(FixedWindow),
    /// Bursty or warming-up token bucket
    Smooth(SmoothBandwidth),
    /// Algorithm resolved from the factory's registry
    #[serde(skip)]
    Custom(Box<dyn CustomBandwidth>),
}

impl Bandwidth {
    /// Reserve `permits`, returning how long the caller must wait before
    /// proceeding, or `None` if they cannot be had within `timeout`.
    ///
    /// A zero-permit request is always granted without touching state.
    pub fn try_reserve(&mut self, permits: u64, timeout: Duration, now_micros: u64) -> Option<Duration> {
        if permits == 0 {
            return Some(Duration::ZERO);
        }
        let timeout_micros = micros(timeout);

        let wait = match self {
            Bandwidth::FixedWindow(window) => window.try_reserve(permits, now_micros),
            Bandwidth::Smooth(bucket) => bucket.try_reserve(permits, timeout_micros, now_micros),
            Bandwidth::Custom(custom) => custom.try_reserve(permits, timeout_micros, now_micros),
        };
        wait.map(Duration::from_micros)
    }

    /// Reserve without reporting the wait.
    pub fn try_acquire(&mut self, permits: u64, timeout: Duration, now_micros: u64) -> bool {
        self.try_reserve(permits, timeout, now_micros).is_some()
    }

    pub fn query_earliest_available(&self, now_micros: u64) -> u64 {
        match self {
            Bandwidth::FixedWindow(window) => window.query_earliest_available(now_micros),
            Bandwidth::Smooth(bucket) => bucket.query_earliest_available(now_micros),
            Bandwidth::Custom(custom) => custom.query_earliest_available(now_micros),
        }
    }

    pub fn is_available(&self, now_micros: u64) -> bool {
        self.query_earliest_available(now_micros) <= now_micros
    }

    pub fn permits_per_second(&self) -> f64 {
        match self {
            Bandwidth::FixedWindow(window) => window.permits_per_second(),
            Bandwidth::Smooth(bucket) => bucket.permits_per_second(),
            Bandwidth::Custom(custom) => custom.permits_per_second(),
        }
    }

    /// Short algorithm name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Bandwidth::FixedWindow(_) => "all_or_nothing",
            Bandwidth::Smooth(bucket) if bucket.is_warming_up() => "warming_up",
            Bandwidth::Smooth(_) => "bursty",
            Bandwidth::Custom(_) => "custom",
        }
    }
}
