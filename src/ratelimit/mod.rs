//! Rate limiting engine: per-resource limiters and the tree evaluator.

mod descriptor;
mod limiter;
mod listener;
mod matcher;
mod provider;
pub mod rules;
mod store;
mod ticker;
mod tree_limiter;

pub use descriptor::ResourceKey;
pub use limiter::{BandwidthLimiter, ResourceLimiter, SharedStore};
pub use listener::{LimitDescriptor, Listeners, NoopListener, TracingListener, UsageListener};
pub use matcher::{AndThen, MatchAll, Matcher, MatcherExt, ResourcePathMatcher, ResourceRequest};
pub use provider::{
    default_resource_id, LimiterProvider, MatcherProvider, PathMatcherProvider, RateSource, RatesLimiterProvider,
};
pub use rules::{LimitsConfig, RateRule, ResourceConfig, TimeUnit};
pub use store::{BandwidthStore, Cache, CacheBandwidthStore, InMemoryBandwidthStore};
pub use ticker::{ManualTicker, SystemTicker, Ticker};
pub use tree_limiter::{RateConfigLimiterTree, ResourceLimiterTree};
