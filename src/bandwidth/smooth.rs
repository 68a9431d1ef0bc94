//! Smooth token-bucket bandwidths: bursty and warming-up.
//!
//! Both variants store permits that accrue continuously while the bandwidth
//! is idle and track a `next_free` marker, the earliest instant a new
//! reservation may start. A request spends stored permits first and waits
//! only for the remainder to accrue at the stable rate. Spending stored
//! permits is free for the bursty variant; for the warming-up variant it
//! costs the area under the cold-to-stable ramp, and that cost is charged
//! to whoever reserves next.
//!
//! A bucket always holds room for at least one permit, so rates slower than
//! one permit per burst window still grant a single request immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Ramp {
    /// Stored permits are free
    Bursty,
    /// Stored permits above `threshold_permits` cost more the colder the bucket is
    WarmingUp {
        warmup_period_micros: f64,
        threshold_permits: f64,
        slope: f64,
    },
}

/// Token bucket shared by the bursty and warming-up algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothBandwidth {
    stored_permits: f64,
    max_permits: f64,
    /// Interval between permits at the stable rate; infinite for a zero rate
    #[serde(with = "interval")]
    stable_interval_micros: f64,
    next_free_micros: u64,
    ramp: Ramp,
}

impl SmoothBandwidth {
    /// A bursty bucket that starts full and holds at most
    /// `permits_per_second * max_burst_seconds` permits, and never less than one.
    pub fn bursty(permits_per_second: f64, max_burst_seconds: f64, now_micros: u64) -> Self {
        let stable = stable_interval(permits_per_second);
        let max_permits = capacity(permits_per_second * max_burst_seconds, stable);
        Self {
            stored_permits: max_permits,
            max_permits,
            stable_interval_micros: stable,
            next_free_micros: now_micros,
            ramp: Ramp::Bursty,
        }
    }

    /// A warming-up bucket that starts full, which is its coldest state.
    pub fn warming_up(
        permits_per_second: f64,
        warmup_period: Duration,
        cold_factor: f64,
        now_micros: u64,
    ) -> Self {
        let stable = stable_interval(permits_per_second);
        let warmup_period_micros = warmup_period.as_micros() as f64;

        let (threshold_permits, max_permits, slope) = if stable.is_finite() {
            let cold = stable * cold_factor;
            let threshold = 0.5 * warmup_period_micros / stable;
            let max = capacity(threshold + 2.0 * warmup_period_micros / (stable + cold), stable);
            let slope = if max > threshold {
                (cold - stable) / (max - threshold)
            } else {
                0.0
            };
            (threshold, max, slope)
        } else {
            (0.0, 0.0, 0.0)
        };

        Self {
            stored_permits: max_permits,
            max_permits,
            stable_interval_micros: stable,
            next_free_micros: now_micros,
            ramp: Ramp::WarmingUp {
                warmup_period_micros,
                threshold_permits,
                slope,
            },
        }
    }

    pub fn is_warming_up(&self) -> bool {
        matches!(self.ramp, Ramp::WarmingUp { .. })
    }

    pub fn max_permits(&self) -> f64 {
        self.max_permits
    }

    /// Permits stored as of `now_micros`, without mutating state.
    pub fn stored_permits(&self, now_micros: u64) -> f64 {
        if now_micros > self.next_free_micros {
            let accrued = (now_micros - self.next_free_micros) as f64 / self.cool_down_interval();
            self.max_permits.min(self.stored_permits + accrued)
        } else {
            self.stored_permits
        }
    }

    pub fn permits_per_second(&self) -> f64 {
        if self.stable_interval_micros.is_finite() {
            MICROS_PER_SECOND / self.stable_interval_micros
        } else {
            0.0
        }
    }

    pub fn query_earliest_available(&self, _now_micros: u64) -> u64 {
        self.next_free_micros
    }

    /// Reserve `permits` if they can be had within `timeout_micros`.
    ///
    /// Returns how long the caller must wait before proceeding. A rejected
    /// request only brings the stored permits up to date; it never moves
    /// `next_free` forward.
    pub fn try_reserve(&mut self, permits: u64, timeout_micros: u64, now_micros: u64) -> Option<u64> {
        self.resync(now_micros);

        let requested = permits as f64;
        let spend_stored = requested.min(self.stored_permits);
        let fresh = requested - spend_stored;

        let fresh_micros = if fresh > 0.0 {
            fresh * self.stable_interval_micros
        } else {
            0.0
        };
        if !fresh_micros.is_finite() {
            return None;
        }

        let moment = self.next_free_micros.saturating_add(fresh_micros as u64);
        let wait = moment - now_micros;
        if wait > timeout_micros {
            return None;
        }

        let penalty = self.stored_permits_to_wait_time(self.stored_permits, spend_stored);
        self.next_free_micros = moment.saturating_add(penalty as u64);
        self.stored_permits -= spend_stored;

        Some(wait)
    }

    /// Interval at which stored permits come back while idle.
    fn cool_down_interval(&self) -> f64 {
        match self.ramp {
            Ramp::Bursty => self.stable_interval_micros,
            Ramp::WarmingUp {
                warmup_period_micros,
                ..
            } => {
                if self.max_permits > 0.0 {
                    warmup_period_micros / self.max_permits
                } else {
                    f64::INFINITY
                }
            }
        }
    }

    fn resync(&mut self, now_micros: u64) {
        if now_micros > self.next_free_micros {
            self.stored_permits = self.stored_permits(now_micros);
            self.next_free_micros = now_micros;
        }
    }

    /// Throttling owed for taking `permits_to_take` out of `stored` permits.
    ///
    /// For the warming-up ramp this is the trapezoid under the interval
    /// function between the current and post-consumption stored levels.
    fn stored_permits_to_wait_time(&self, stored: f64, permits_to_take: f64) -> f64 {
        match self.ramp {
            Ramp::Bursty => 0.0,
            Ramp::WarmingUp {
                threshold_permits,
                slope,
                ..
            } => {
                let mut remaining = permits_to_take;
                let mut micros = 0.0;
                let above_threshold = stored - threshold_permits;
                if above_threshold > 0.0 {
                    let take_above = above_threshold.min(remaining);
                    let permits_to_time = |p: f64| self.stable_interval_micros + p * slope;
                    let length = permits_to_time(above_threshold)
                        + permits_to_time(above_threshold - take_above);
                    micros = take_above * length / 2.0;
                    remaining -= take_above;
                }
                micros + self.stable_interval_micros * remaining
            }
        }
    }
}

/// Bucket size: `max_permits` floored at one permit, or zero for a zero rate.
fn capacity(max_permits: f64, stable_interval_micros: f64) -> f64 {
    if stable_interval_micros.is_finite() {
        max_permits.max(1.0)
    } else {
        0.0
    }
}

/// Infinite intervals travel as `null`, which is all JSON can express.
mod interval {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(micros: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        micros.is_finite().then_some(*micros).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

fn stable_interval(permits_per_second: f64) -> f64 {
    if permits_per_second > 0.0 {
        MICROS_PER_SECOND / permits_per_second
    } else {
        f64::INFINITY
    }
}
