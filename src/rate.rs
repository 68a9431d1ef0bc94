//! Quota definitions: a single `Rate` and a node's full `Rates` specification.
//!
//! These are plain configuration values. They carry no admission state; a
//! [`BandwidthFactory`](crate::bandwidth::BandwidthFactory) turns them into
//! live bandwidths at a given instant.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RateTreeError, Result};

/// How the members of a composite quota combine into one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Exceeded if any member is exceeded
    #[default]
    And,
    /// Exceeded only if every member is exceeded
    Or,
    /// Never exceeded
    None,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => write!(f, "AND"),
            Operator::Or => write!(f, "OR"),
            Operator::None => write!(f, "NONE"),
        }
    }
}

/// The admission algorithm backing a rate.
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    /// Fixed window: `permits` per window, no waiting, reset when the window elapses
    AllOrNothing,
    /// Token bucket holding at most `max_burst_seconds` worth of permits
    Bursty { max_burst_seconds: f64 },
    /// Token bucket that ramps from `cold_factor` times the stable interval
    /// down to the stable interval over `warmup_period`
    WarmingUp {
        warmup_period: Duration,
        cold_factor: f64,
    },
    /// Algorithm registered by name with a [`BandwidthFactory`](crate::bandwidth::BandwidthFactory)
    Custom(String),
}

impl Algorithm {
    /// Bursty token bucket with the default one second burst window.
    pub fn bursty() -> Self {
        Algorithm::Bursty {
            max_burst_seconds: 1.0,
        }
    }

    /// Warming-up token bucket with the customary cold factor of 3.
    pub fn warming_up(warmup_period: Duration) -> Self {
        Algorithm::WarmingUp {
            warmup_period,
            cold_factor: 3.0,
        }
    }

    /// Check the algorithm parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Algorithm::AllOrNothing | Algorithm::Custom(_) => Ok(()),
            Algorithm::Bursty { max_burst_seconds } => {
                if !max_burst_seconds.is_finite() || *max_burst_seconds <= 0.0 {
                    return Err(RateTreeError::InvalidRate(format!(
                        "max_burst_seconds must be positive, got {}",
                        max_burst_seconds
                    )));
                }
                Ok(())
            }
            Algorithm::WarmingUp {
                warmup_period,
                cold_factor,
            } => {
                if warmup_period.is_zero() {
                    return Err(RateTreeError::InvalidRate(
                        "warmup_period must be positive".to_string(),
                    ));
                }
                if !cold_factor.is_finite() || *cold_factor < 1.0 {
                    return Err(RateTreeError::InvalidRate(format!(
                        "cold_factor must be at least 1.0, got {}",
                        cold_factor
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::bursty()
    }
}

/// A single quota: `permits` per `duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rate {
    permits: u64,
    duration: Duration,
    /// `None` defers to the factory's default algorithm
    algorithm: Option<Algorithm>,
}

impl Rate {
    /// Create a rate of `permits` per `duration`.
    ///
    /// Fails if `duration` is zero.
    pub fn new(permits: u64, duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(RateTreeError::InvalidRate(format!(
                "duration must be positive for {} permits",
                permits
            )));
        }
        Ok(Self {
            permits,
            duration,
            algorithm: None,
        })
    }

    /// `permits` per second.
    pub fn per_second(permits: u64) -> Self {
        Self {
            permits,
            duration: Duration::from_secs(1),
            algorithm: None,
        }
    }

    /// `permits` per minute.
    pub fn per_minute(permits: u64) -> Self {
        Self {
            permits,
            duration: Duration::from_secs(60),
            algorithm: None,
        }
    }

    /// Pin this rate to a specific algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self> {
        algorithm.validate()?;
        self.algorithm = Some(algorithm);
        Ok(self)
    }

    pub fn permits(&self) -> u64 {
        self.permits
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn algorithm(&self) -> Option<&Algorithm> {
        self.algorithm.as_ref()
    }

    /// Permits accrued per second, computed at nanosecond precision.
    pub fn permits_per_second(&self) -> f64 {
        self.permits as f64 * 1_000_000_000.0 / self.duration.as_nanos() as f64
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.permits, self.duration)
    }
}

/// One node's full quota specification.
///
/// An empty `Rates` means the node performs no limiting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rates {
    operator: Operator,
    limits: Vec<Rate>,
}

impl Rates {
    pub fn new(operator: Operator, limits: Vec<Rate>) -> Self {
        Self { operator, limits }
    }

    /// No limits at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single rate.
    pub fn of(rate: Rate) -> Self {
        Self::new(Operator::And, vec![rate])
    }

    /// Every rate must admit the request.
    pub fn all(limits: Vec<Rate>) -> Self {
        Self::new(Operator::And, limits)
    }

    /// At least one rate must admit the request.
    pub fn any(limits: Vec<Rate>) -> Self {
        Self::new(Operator::Or, limits)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn limits(&self) -> &[Rate] {
        &self.limits
    }

    pub fn has_limits(&self) -> bool {
        !self.limits.is_empty()
    }
}

impl fmt::Display for Rates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limits: Vec<String> = self.limits.iter().map(|r| r.to_string()).collect();
        write!(f, "{}[{}]", self.operator, limits.join(", "))
    }
}

/// The value carried by a configured node of the resource tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RateConfig {
    /// Identifier of the limited resource, usually the node's dotted path
    pub id: String,
    pub rates: Rates,
    /// Activation condition, evaluated by the embedding application
    pub condition: Option<String>,
}

impl RateConfig {
    pub fn new(id: impl Into<String>, rates: Rates) -> Self {
        Self {
            id: id.into(),
            rates,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}
