//! Keys identifying one resource's admission state.

use std::fmt;
use std::sync::Arc;

/// A matched request key scoped to the resource (node) it was matched for.
///
/// Scoping keeps two nodes that match the same application key from sharing
/// counters when they are backed by one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey<K> {
    /// The resource id this key was matched for
    pub resource: Arc<str>,
    /// The key produced by the node's matcher
    pub key: K,
}

impl<K> ResourceKey<K> {
    /// Create a new resource key.
    pub fn new(resource: Arc<str>, key: K) -> Self {
        Self { resource, key }
    }
}

impl<K: fmt::Display> ResourceKey<K> {
    /// Convert the key to a string representation.
    ///
    /// This is the form external caches typically use as their key.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.resource, self.key)
    }
}

impl<K: fmt::Display> fmt::Display for ResourceKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
