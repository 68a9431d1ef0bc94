//! Turning rate definitions into live bandwidths.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Bandwidth, Bandwidths, CustomBandwidth, FixedWindow, SmoothBandwidth};
use crate::error::{RateTreeError, Result};
use crate::rate::{Algorithm, Rate, Rates};

/// Constructor for a named custom algorithm: `(rate, now_micros) -> bandwidth`.
pub type CustomConstructor =
    Arc<dyn Fn(&Rate, u64) -> Result<Box<dyn CustomBandwidth>> + Send + Sync>;

/// Creates bandwidths from rates.
///
/// Rates that do not name an algorithm get the factory's default, which is
/// set explicitly by whoever builds the engine (see
/// [`EngineConfig`](crate::config::EngineConfig)).
#[derive(Clone)]
pub struct BandwidthFactory {
    default_algorithm: Algorithm,
    registry: HashMap<String, CustomConstructor>,
}

impl BandwidthFactory {
    /// Create a factory using `default_algorithm` for rates without one.
    pub fn new(default_algorithm: Algorithm) -> Result<Self> {
        default_algorithm.validate()?;
        Ok(Self {
            default_algorithm,
            registry: HashMap::new(),
        })
    }

    /// Register a custom algorithm under `name`.
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Rate, u64) -> Result<Box<dyn CustomBandwidth>> + Send + Sync + 'static,
    {
        self.registry.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn default_algorithm(&self) -> &Algorithm {
        &self.default_algorithm
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Create the bandwidth for one rate, starting at `now_micros`.
    pub fn create(&self, rate: &Rate, now_micros: u64) -> Result<Bandwidth> {
        let algorithm = rate.algorithm().unwrap_or(&self.default_algorithm);
        algorithm.validate()?;

        let bandwidth = match algorithm {
            Algorithm::AllOrNothing => {
                Bandwidth::FixedWindow(FixedWindow::new(rate.permits(), rate.duration(), now_micros))
            }
            Algorithm::Bursty { max_burst_seconds } => Bandwidth::Smooth(SmoothBandwidth::bursty(
                rate.permits_per_second(),
                *max_burst_seconds,
                now_micros,
            )),
            Algorithm::WarmingUp {
                warmup_period,
                cold_factor,
            } => Bandwidth::Smooth(SmoothBandwidth::warming_up(
                rate.permits_per_second(),
                *warmup_period,
                *cold_factor,
                now_micros,
            )),
            Algorithm::Custom(name) => {
                let constructor = self
                    .registry
                    .get(name)
                    .ok_or_else(|| RateTreeError::UnknownAlgorithm(name.clone()))?;
                Bandwidth::Custom(constructor(rate, now_micros)?)
            }
        };
        Ok(bandwidth)
    }

    /// Create one bandwidth per rate, preserving definition order.
    pub fn create_all(&self, rates: &Rates, now_micros: u64) -> Result<Bandwidths> {
        let members = rates
            .limits()
            .iter()
            .map(|rate| self.create(rate, now_micros))
            .collect::<Result<Vec<_>>>()?;
        Ok(Bandwidths::new(rates.operator(), members))
    }
}

impl Default for BandwidthFactory {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::default(),
            registry: HashMap::new(),
        }
    }
}

impl fmt::Debug for BandwidthFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.registry.keys().collect();
        names.sort();
        f.debug_struct("BandwidthFactory")
            .field("default_algorithm", &self.default_algorithm)
            .field("registered", &names)
            .finish()
    }
}
