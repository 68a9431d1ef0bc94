//! Admission decisions over a tree of resource limiters.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::limiter::SharedStore;
use super::listener::{NoopListener, UsageListener};
use super::matcher::ResourceRequest;
use super::provider::{LimiterProvider, MatcherProvider, PathMatcherProvider, RateSource, RatesLimiterProvider};
use crate::bandwidth::BandwidthFactory;
use crate::error::Result;
use crate::rate::RateConfig;
use crate::tree::{NodeId, NodeRef, Tree};

/// Outcome of evaluating one node for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchResult {
    Success,
    Failure,
    NoMatch,
}

/// Evaluates requests against every limited path of a resource tree.
///
/// Each leaf is evaluated independently. From the leaf the evaluator climbs
/// towards the root, consuming at every configured node whose matcher
/// accepts the request. Climbing stops at the root, at the first node
/// without a value, or at the first node that did not succeed, so a
/// method-level quota and the enclosing class-level quota both apply while
/// an unmatched node shields its ancestors.
///
/// A request is admitted only if no node on any evaluated chain rejected it.
/// Consumption is never rolled back: when one chain rejects, permits already
/// taken by other nodes stay taken.
pub struct ResourceLimiterTree<V, R, K> {
    tree: Arc<Tree<V>>,
    leaves: Vec<NodeId>,
    matcher_provider: Arc<dyn MatcherProvider<V, R, K>>,
    limiter_provider: Arc<dyn LimiterProvider<V, K>>,
    listener: Arc<dyn UsageListener<K>>,
    first_match_only: bool,
}

/// Evaluator over trees built from limits configuration.
pub type RateConfigLimiterTree<R, K> = ResourceLimiterTree<RateConfig, R, K>;

impl<V, R, K> ResourceLimiterTree<V, R, K>
where
    V: 'static,
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create an evaluator. The tree's leaves are recorded once, here.
    pub fn new<M, L>(tree: impl Into<Arc<Tree<V>>>, matcher_provider: M, limiter_provider: L) -> Self
    where
        M: MatcherProvider<V, R, K> + 'static,
        L: LimiterProvider<V, K> + 'static,
    {
        let tree = tree.into();
        let leaves = tree.leaves();
        debug!(nodes = tree.len(), leaves = leaves.len(), "Created resource limiter tree");

        Self {
            tree,
            leaves,
            matcher_provider: Arc::new(matcher_provider),
            limiter_provider: Arc::new(limiter_provider),
            listener: Arc::new(NoopListener),
            first_match_only: false,
        }
    }

    /// Install the sink notified after every node-level attempt.
    pub fn with_listener(mut self, listener: Arc<dyn UsageListener<K>>) -> Self {
        self.listener = listener;
        self
    }

    /// Keep every node's bandwidths in `store`, e.g. a cache shared with
    /// other evaluators or processes.
    pub fn with_store(mut self, store: SharedStore<K>) -> Self {
        self.limiter_provider = self.limiter_provider.with_store(store);
        self
    }

    /// Stop after the first leaf whose chain produced any success.
    ///
    /// Use when configured paths are alternatives rather than cumulative
    /// restrictions.
    pub fn with_first_match_only(mut self, first_match_only: bool) -> Self {
        self.first_match_only = first_match_only;
        self
    }

    pub fn tree(&self) -> &Tree<V> {
        &self.tree
    }

    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    pub fn is_first_match_only(&self) -> bool {
        self.first_match_only
    }

    /// Consume `permits` for `request`, waiting at most `timeout` in total.
    ///
    /// Time slept at one node is deducted from what later nodes may wait.
    /// Returns `Ok(false)` when any evaluated node rejected the request.
    /// Provider failures are returned as errors, with node state left as far
    /// as evaluation progressed.
    pub fn try_consume(&self, request: &R, permits: u64, timeout: Duration) -> Result<bool> {
        let mut failures = 0usize;
        let mut remaining = timeout;

        for &leaf in &self.leaves {
            let mut successes = 0usize;
            let mut current = Some(self.tree.node(leaf)?);

            while let Some(node) = current {
                if node.is_root() || node.value().is_none() {
                    break;
                }

                let result = self.evaluate(node, request, permits, &mut remaining)?;
                match result {
                    MatchResult::Success => successes += 1,
                    MatchResult::Failure => failures += 1,
                    MatchResult::NoMatch => {}
                }
                if result != MatchResult::Success {
                    break;
                }
                current = node.parent();
            }

            if self.first_match_only && successes > 0 {
                break;
            }
        }

        Ok(failures == 0)
    }

    /// Consume a single permit without waiting.
    pub fn try_acquire(&self, request: &R) -> Result<bool> {
        self.try_consume(request, 1, Duration::ZERO)
    }

    fn evaluate(
        &self,
        node: NodeRef<'_, V>,
        request: &R,
        permits: u64,
        remaining: &mut Duration,
    ) -> Result<MatchResult> {
        let limiter = self.limiter_provider.limiter(node)?;
        let Some(limit) = limiter.descriptor() else {
            return Ok(MatchResult::NoMatch);
        };

        let matcher = self.matcher_provider.matcher(node)?;
        let Some(key) = matcher.match_or_none(request) else {
            trace!(node = node.name(), "Request did not match node");
            return Ok(MatchResult::NoMatch);
        };

        let waited = limiter.reserve_and_wait(&key, permits, *remaining)?;
        self.listener.on_consumed(&key, permits, limit);
        if let Some(waited) = waited {
            *remaining = remaining.saturating_sub(waited);
            return Ok(MatchResult::Success);
        }

        self.listener.on_rejected(&key, permits, limit);
        debug!(
            resource = %limit.resource,
            key = ?key,
            permits,
            limit = %limit.rates,
            "Request rejected"
        );
        Ok(MatchResult::Failure)
    }
}

impl<V> ResourceLimiterTree<V, ResourceRequest, String>
where
    V: RateSource + Send + Sync + 'static,
{
    /// Evaluator that matches requests by dotted resource path and keeps
    /// bandwidths in process memory.
    pub fn from_rates(tree: impl Into<Arc<Tree<V>>>, factory: BandwidthFactory) -> Self {
        Self::new(
            tree,
            PathMatcherProvider::new(),
            RatesLimiterProvider::in_memory(factory),
        )
    }
}

impl<V, R, K> Debug for ResourceLimiterTree<V, R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLimiterTree")
            .field("nodes", &self.tree.len())
            .field("leaves", &self.leaves.len())
            .field("first_match_only", &self.first_match_only)
            .finish()
    }
}
