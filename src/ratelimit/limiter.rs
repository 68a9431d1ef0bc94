//! Single-resource limiter: one node's rates applied per request key.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::descriptor::ResourceKey;
use super::listener::LimitDescriptor;
use super::store::BandwidthStore;
use super::ticker::Ticker;
use crate::bandwidth::{micros, BandwidthFactory};
use crate::error::Result;
use crate::rate::Rates;

/// Store shared by the limiters of one tree.
pub type SharedStore<K> = Arc<dyn BandwidthStore<ResourceKey<K>>>;

/// Limiter for a single resource.
///
/// [`ResourceLimiter::NoOp`] is the sentinel for nodes that perform no
/// limiting; the tree evaluator treats it as "no match".
pub enum ResourceLimiter<K> {
    NoOp,
    Limiting(BandwidthLimiter<K>),
}

impl<K> ResourceLimiter<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn is_no_op(&self) -> bool {
        matches!(self, ResourceLimiter::NoOp)
    }

    /// The enforced limit; `None` for the no-op sentinel.
    pub fn descriptor(&self) -> Option<&LimitDescriptor> {
        match self {
            ResourceLimiter::NoOp => None,
            ResourceLimiter::Limiting(limiter) => Some(limiter.descriptor()),
        }
    }

    /// Consume `permits` for `key`, waiting at most `timeout`.
    pub fn try_consume(&self, key: &K, permits: u64, timeout: Duration) -> Result<bool> {
        Ok(self.reserve_and_wait(key, permits, timeout)?.is_some())
    }

    /// Consume `permits` for `key`, returning how long the caller slept, or
    /// `None` if the permits were not granted within `timeout`.
    pub fn reserve_and_wait(&self, key: &K, permits: u64, timeout: Duration) -> Result<Option<Duration>> {
        match self {
            ResourceLimiter::NoOp => Ok(Some(Duration::ZERO)),
            ResourceLimiter::Limiting(limiter) => limiter.reserve_and_wait(key, permits, timeout),
        }
    }
}

impl<K> Debug for ResourceLimiter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceLimiter::NoOp => write!(f, "ResourceLimiter::NoOp"),
            ResourceLimiter::Limiting(limiter) => f
                .debug_struct("ResourceLimiter")
                .field("resource", &limiter.descriptor.resource)
                .field("rates", &limiter.descriptor.rates)
                .finish(),
        }
    }
}

/// Limiter backed by bandwidths held in a [`BandwidthStore`].
///
/// The first request for a key creates its bandwidths at that instant.
/// Reservation goes through [`BandwidthStore::update`], so the store sees
/// the new state before the limiter returns; any wait is slept afterwards,
/// outside the store.
pub struct BandwidthLimiter<K> {
    descriptor: LimitDescriptor,
    factory: Arc<BandwidthFactory>,
    store: SharedStore<K>,
    ticker: Arc<dyn Ticker>,
}

impl<K> BandwidthLimiter<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create a limiter for `resource`.
    ///
    /// Fails if `rates` cannot be turned into bandwidths by `factory`.
    pub fn new(
        resource: Arc<str>,
        rates: Rates,
        factory: Arc<BandwidthFactory>,
        store: SharedStore<K>,
        ticker: Arc<dyn Ticker>,
    ) -> Result<Self> {
        // Surface configuration errors now rather than on the first request
        factory.create_all(&rates, 0)?;

        debug!(resource = %resource, rates = %rates, "Creating resource limiter");
        Ok(Self {
            descriptor: LimitDescriptor { resource, rates },
            factory,
            store,
            ticker,
        })
    }

    pub fn descriptor(&self) -> &LimitDescriptor {
        &self.descriptor
    }

    /// Consume `permits` for `key`, waiting at most `timeout`.
    pub fn try_consume(&self, key: &K, permits: u64, timeout: Duration) -> Result<bool> {
        Ok(self.reserve_and_wait(key, permits, timeout)?.is_some())
    }

    /// Consume `permits` for `key`, returning the time slept or `None` if
    /// the permits are not available within `timeout`.
    pub fn reserve_and_wait(&self, key: &K, permits: u64, timeout: Duration) -> Result<Option<Duration>> {
        let resource_key = ResourceKey::new(self.descriptor.resource.clone(), key.clone());

        let mut wait = None;
        self.store.update(
            resource_key,
            &mut || {
                trace!(resource = %self.descriptor.resource, key = ?key, "Creating bandwidths for new key");
                self.factory
                    .create_all(&self.descriptor.rates, self.ticker.elapsed_micros())
            },
            &mut |bandwidths| {
                // Read the clock inside the update so reservations stay monotonic
                let now = self.ticker.elapsed_micros();
                wait = bandwidths.try_reserve(permits, timeout, now);
            },
        )?;

        if let Some(wait) = wait {
            trace!(
                resource = %self.descriptor.resource,
                key = ?key,
                permits,
                wait_micros = micros(wait),
                "Permits granted"
            );
            self.ticker.sleep(wait);
        }
        Ok(wait)
    }
}
