//! Per-node matcher and limiter resolution.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use super::descriptor::ResourceKey;
use super::limiter::{BandwidthLimiter, ResourceLimiter, SharedStore};
use super::matcher::{Matcher, ResourcePathMatcher, ResourceRequest};
use super::store::InMemoryBandwidthStore;
use super::ticker::{SystemTicker, Ticker};
use crate::bandwidth::BandwidthFactory;
use crate::error::{RateTreeError, Result};
use crate::rate::{RateConfig, Rates};
use crate::tree::{NodeId, NodeRef};

/// Supplies the matcher for a node.
pub trait MatcherProvider<V, R, K>: Send + Sync {
    fn matcher(&self, node: NodeRef<'_, V>) -> Result<Arc<dyn Matcher<R, K>>>;
}

impl<V, R, K, F> MatcherProvider<V, R, K> for F
where
    F: for<'a> Fn(NodeRef<'a, V>) -> Result<Arc<dyn Matcher<R, K>>> + Send + Sync,
{
    fn matcher(&self, node: NodeRef<'_, V>) -> Result<Arc<dyn Matcher<R, K>>> {
        self(node)
    }
}

/// Supplies the single-resource limiter for a node.
pub trait LimiterProvider<V, K>: Send + Sync {
    fn limiter(&self, node: NodeRef<'_, V>) -> Result<Arc<ResourceLimiter<K>>>;

    /// An equivalent provider whose limiters all keep state in `store`.
    fn with_store(&self, store: SharedStore<K>) -> Arc<dyn LimiterProvider<V, K>>;
}

/// Node values that may carry rates.
pub trait RateSource {
    fn rates(&self) -> Option<&Rates>;

    /// Resource id for the node; defaults to the node's dotted path.
    fn resource_id(&self) -> Option<&str> {
        None
    }
}

impl RateSource for RateConfig {
    fn rates(&self) -> Option<&Rates> {
        Some(&self.rates)
    }

    fn resource_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl RateSource for Rates {
    fn rates(&self) -> Option<&Rates> {
        Some(self)
    }
}

/// Resource id used for `node` when its value names none.
pub fn default_resource_id<V>(node: NodeRef<'_, V>) -> String {
    if node.is_root() {
        node.name().to_string()
    } else {
        node.path(".")
    }
}

/// Builds one [`BandwidthLimiter`] per configured node from the node's
/// rates, and caches it for the provider's lifetime.
pub struct RatesLimiterProvider<K> {
    factory: Arc<BandwidthFactory>,
    store: SharedStore<K>,
    ticker: Arc<dyn Ticker>,
    limiters: DashMap<NodeId, Arc<ResourceLimiter<K>>>,
}

impl<K> RatesLimiterProvider<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(factory: Arc<BandwidthFactory>, store: SharedStore<K>, ticker: Arc<dyn Ticker>) -> Self {
        Self {
            factory,
            store,
            ticker,
            limiters: DashMap::new(),
        }
    }

    /// Process-local state on the system clock.
    pub fn in_memory(factory: BandwidthFactory) -> Self {
        Self::new(
            Arc::new(factory),
            Arc::new(InMemoryBandwidthStore::<ResourceKey<K>>::new()),
            Arc::new(SystemTicker::new()),
        )
    }

    pub fn with_ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
        self.ticker = ticker;
        self.limiters.clear();
        self
    }

    fn create<V: RateSource>(&self, node: NodeRef<'_, V>) -> Result<ResourceLimiter<K>> {
        let Some(value) = node.value() else {
            return Ok(ResourceLimiter::NoOp);
        };
        let rates = match value.rates() {
            Some(rates) if rates.has_limits() => rates.clone(),
            _ => return Ok(ResourceLimiter::NoOp),
        };
        let resource: Arc<str> = match value.resource_id() {
            Some(id) => Arc::from(id),
            None => Arc::from(default_resource_id(node)),
        };

        let limiter = BandwidthLimiter::new(
            resource,
            rates,
            self.factory.clone(),
            self.store.clone(),
            self.ticker.clone(),
        )
        .map_err(|e| RateTreeError::provider(node.name(), e.to_string()))?;
        Ok(ResourceLimiter::Limiting(limiter))
    }
}

impl<V, K> LimiterProvider<V, K> for RatesLimiterProvider<K>
where
    V: RateSource + 'static,
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn limiter(&self, node: NodeRef<'_, V>) -> Result<Arc<ResourceLimiter<K>>> {
        if let Some(cached) = self.limiters.get(&node.id()) {
            return Ok(cached.value().clone());
        }
        let created = Arc::new(self.create(node)?);
        let entry = self.limiters.entry(node.id()).or_insert(created);
        Ok(entry.value().clone())
    }

    fn with_store(&self, store: SharedStore<K>) -> Arc<dyn LimiterProvider<V, K>> {
        Arc::new(RatesLimiterProvider::new(
            self.factory.clone(),
            store,
            self.ticker.clone(),
        ))
    }
}

/// Gives every node a [`ResourcePathMatcher`] on its dotted path.
#[derive(Debug, Default)]
pub struct PathMatcherProvider {
    matchers: DashMap<NodeId, Arc<ResourcePathMatcher>>,
}

impl PathMatcherProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V> MatcherProvider<V, ResourceRequest, String> for PathMatcherProvider {
    fn matcher(&self, node: NodeRef<'_, V>) -> Result<Arc<dyn Matcher<ResourceRequest, String>>> {
        let matcher: Arc<dyn Matcher<ResourceRequest, String>> = self
            .matchers
            .entry(node.id())
            .or_insert_with(|| Arc::new(ResourcePathMatcher::new(node.path("."))))
            .value()
            .clone();
        Ok(matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ticker::ManualTicker;
    use crate::rate::Rate;
    use crate::tree::Tree;
    use std::time::Duration;

    fn config_tree() -> Tree<RateConfig> {
        let mut tree = Tree::new("root", None);
        let root = tree.root();
        let api = tree.add_child(root, "api", None).unwrap();
        tree.add_child(
            api,
            "users",
            Some(RateConfig::new("api.users", Rates::of(Rate::per_second(1)))),
        )
        .unwrap();
        tree.add_child(api, "orders", Some(RateConfig::new("api.orders", Rates::none())))
            .unwrap();
        tree
    }

    fn provider() -> RatesLimiterProvider<String> {
        RatesLimiterProvider::in_memory(BandwidthFactory::default())
            .with_ticker(Arc::new(ManualTicker::new()))
    }

    #[test]
    fn test_unconfigured_and_empty_nodes_are_no_op() {
        let tree = config_tree();
        let provider = provider();

        let api = tree.root_node().find_by_name("api").unwrap();
        let orders = tree.root_node().find_by_name("orders").unwrap();
        assert!(provider.limiter(api).unwrap().is_no_op());
        assert!(provider.limiter(orders).unwrap().is_no_op());
    }

    #[test]
    fn test_limiter_cached_per_node() {
        let tree = config_tree();
        let provider = provider();
        let users = tree.root_node().find_by_name("users").unwrap();

        let first = provider.limiter(users).unwrap();
        let second = provider.limiter(users).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first.descriptor().unwrap().resource, "api.users");
    }

    #[test]
    fn test_with_store_shares_state() {
        let tree = config_tree();
        let users = tree.root_node().find_by_name("users").unwrap();
        let store: SharedStore<String> = Arc::new(InMemoryBandwidthStore::<ResourceKey<String>>::new());

        let base = provider();
        let one = LimiterProvider::<RateConfig, String>::with_store(&base, store.clone());
        let two = LimiterProvider::<RateConfig, String>::with_store(&base, store);

        let key = "alice".to_string();
        assert!(one.limiter(users).unwrap().try_consume(&key, 1, Duration::ZERO).unwrap());
        // A separate provider over the same store sees the consumed permit
        assert!(!two.limiter(users).unwrap().try_consume(&key, 1, Duration::ZERO).unwrap());
    }

    #[test]
    fn test_resource_id_defaults_to_path() {
        let mut tree: Tree<Rates> = Tree::new("root", None);
        let root = tree.root();
        let a = tree.add_child(root, "a", None).unwrap();
        let b = tree.add_child(a, "b", Some(Rates::of(Rate::per_second(1)))).unwrap();

        let provider = provider();
        let limiter = provider.limiter(tree.node(b).unwrap()).unwrap();
        assert_eq!(&*limiter.descriptor().unwrap().resource, "a.b");
        assert_eq!(default_resource_id(tree.root_node()), "root");
    }

    #[test]
    fn test_path_matcher_provider() {
        let tree = config_tree();
        let provider = PathMatcherProvider::new();
        let users = tree.root_node().find_by_name("users").unwrap();

        let matcher = provider.matcher(users).unwrap();
        let request = ResourceRequest::new("api.users.list", "alice");
        assert_eq!(matcher.match_or_none(&request), Some("alice".to_string()));
        assert_eq!(matcher.match_or_none(&ResourceRequest::new("api.orders", "alice")), None);
    }

    #[test]
    fn test_closure_matcher_provider() {
        let tree = config_tree();
        let provider = |node: NodeRef<'_, RateConfig>| -> Result<Arc<dyn Matcher<u32, u32>>> {
            let level = node.level() as u32;
            Ok(Arc::new(move |n: &u32| Some(n + level)))
        };
        let users = tree.root_node().find_by_name("users").unwrap();
        let matcher = MatcherProvider::<RateConfig, u32, u32>::matcher(&provider, users).unwrap();
        assert_eq!(matcher.match_or_none(&1), Some(3));
    }
}
