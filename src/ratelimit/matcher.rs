//! Matching requests to resource keys.

use std::marker::PhantomData;

/// Decides whether, and under which key, a request maps to a resource.
///
/// Matchers must be pure: they never touch admission state.
pub trait Matcher<R, K>: Send + Sync {
    /// The key for `request`, or `None` if it does not match.
    fn match_or_none(&self, request: &R) -> Option<K>;
}

impl<R, K, F> Matcher<R, K> for F
where
    F: Fn(&R) -> Option<K> + Send + Sync,
{
    fn match_or_none(&self, request: &R) -> Option<K> {
        self(request)
    }
}

/// Composition helpers for matchers.
pub trait MatcherExt<R, K>: Matcher<R, K> + Sized {
    /// Match with `self`, then forward the resulting key to `next`.
    ///
    /// Short-circuits when `self` does not match.
    fn and_then<K2, M>(self, next: M) -> AndThen<Self, M, K>
    where
        M: Matcher<K, K2>,
    {
        AndThen {
            first: self,
            next,
            _key: PhantomData,
        }
    }
}

impl<R, K, M: Matcher<R, K>> MatcherExt<R, K> for M {}

/// See [`MatcherExt::and_then`].
pub struct AndThen<A, B, K> {
    first: A,
    next: B,
    _key: PhantomData<fn() -> K>,
}

impl<R, K, K2, A, B> Matcher<R, K2> for AndThen<A, B, K>
where
    A: Matcher<R, K>,
    B: Matcher<K, K2>,
{
    fn match_or_none(&self, request: &R) -> Option<K2> {
        let key = self.first.match_or_none(request)?;
        self.next.match_or_none(&key)
    }
}

/// Matches every request, keyed by a clone of the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl<R: Clone> Matcher<R, R> for MatchAll {
    fn match_or_none(&self, request: &R) -> Option<R> {
        Some(request.clone())
    }
}

/// A request addressed to a dotted resource path on behalf of a caller key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRequest {
    /// Dotted path of the resource being invoked, e.g. `api.users.get`
    pub resource: String,
    /// Caller identity the quota is tracked against
    pub key: String,
}

impl ResourceRequest {
    pub fn new(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            key: key.into(),
        }
    }
}

/// Matches requests whose resource is `path` or lies below it.
#[derive(Debug, Clone)]
pub struct ResourcePathMatcher {
    path: String,
}

impl ResourcePathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Matcher<ResourceRequest, String> for ResourcePathMatcher {
    fn match_or_none(&self, request: &ResourceRequest) -> Option<String> {
        let below = request
            .resource
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'));
        below.then(|| request.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_matcher() {
        let even = |n: &u32| if n % 2 == 0 { Some(n / 2) } else { None };
        assert_eq!(even.match_or_none(&4), Some(2));
        assert_eq!(even.match_or_none(&3), None);
    }

    #[test]
    fn test_and_then_forwards_key() {
        let first = |s: &String| s.strip_prefix("user:").map(str::to_string);
        let second = |id: &String| id.parse::<u64>().ok();
        let matcher = first.and_then(second);

        assert_eq!(matcher.match_or_none(&"user:42".to_string()), Some(42));
        assert_eq!(matcher.match_or_none(&"user:abc".to_string()), None);
        assert_eq!(matcher.match_or_none(&"group:42".to_string()), None);
    }

    #[test]
    fn test_and_then_short_circuits() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let never = |_: &u32| -> Option<u32> { None };
        let counted = |k: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(*k)
        };
        let matcher = never.and_then(counted);
        assert_eq!(matcher.match_or_none(&1), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_match_all() {
        assert_eq!(MatchAll.match_or_none(&"x".to_string()), Some("x".to_string()));
    }

    #[test]
    fn test_resource_path_matcher() {
        let matcher = ResourcePathMatcher::new("api.users");

        let exact = ResourceRequest::new("api.users", "alice");
        let below = ResourceRequest::new("api.users.get", "bob");
        let sibling = ResourceRequest::new("api.usersettings", "carol");
        let other = ResourceRequest::new("api.orders", "dave");

        assert_eq!(matcher.match_or_none(&exact), Some("alice".to_string()));
        assert_eq!(matcher.match_or_none(&below), Some("bob".to_string()));
        assert_eq!(matcher.match_or_none(&sibling), None);
        assert_eq!(matcher.match_or_none(&other), None);
    }
}
