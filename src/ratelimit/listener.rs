//! Usage notifications emitted after every node-level attempt.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::rate::Rates;

/// The limit a node enforces, reported alongside each notification.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitDescriptor {
    /// Resource id of the node
    pub resource: Arc<str>,
    /// The node's configured rates
    pub rates: Rates,
}

/// Sink for usage notifications.
///
/// Called from whichever thread performed the attempt; implementations must
/// tolerate concurrent calls. Return values are not consumed.
pub trait UsageListener<K>: Send + Sync {
    /// Permits were attempted against `limit` for `key`.
    fn on_consumed(&self, key: &K, permits: u64, limit: &LimitDescriptor);

    /// The attempt was rejected. Always preceded by `on_consumed`.
    fn on_rejected(&self, key: &K, permits: u64, limit: &LimitDescriptor);
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl<K> UsageListener<K> for NoopListener {
    fn on_consumed(&self, _key: &K, _permits: u64, _limit: &LimitDescriptor) {}

    fn on_rejected(&self, _key: &K, _permits: u64, _limit: &LimitDescriptor) {}
}

/// Listener that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl<K: Debug> UsageListener<K> for TracingListener {
    fn on_consumed(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
        debug!(
            resource = %limit.resource,
            key = ?key,
            permits,
            limit = %limit.rates,
            "Permits consumed"
        );
    }

    fn on_rejected(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
        warn!(
            resource = %limit.resource,
            key = ?key,
            permits,
            limit = %limit.rates,
            "Rate limit exceeded"
        );
    }
}

/// Fans notifications out to several listeners, in order.
pub struct Listeners<K> {
    listeners: Vec<Arc<dyn UsageListener<K>>>,
}

impl<K> Listeners<K> {
    pub fn new(listeners: Vec<Arc<dyn UsageListener<K>>>) -> Self {
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<K> UsageListener<K> for Listeners<K> {
    fn on_consumed(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
        for listener in &self.listeners {
            listener.on_consumed(key, permits, limit);
        }
    }

    fn on_rejected(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
        for listener in &self.listeners {
            listener.on_rejected(key, permits, limit);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every notification as `(event, resource, key, permits)`.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingListener {
        pub events: Mutex<Vec<(&'static str, String, String, u64)>>,
    }

    impl RecordingListener {
        pub fn rejections(&self) -> usize {
            self.events.lock().iter().filter(|e| e.0 == "rejected").count()
        }

        pub fn consumptions(&self) -> usize {
            self.events.lock().iter().filter(|e| e.0 == "consumed").count()
        }
    }

    impl<K: Debug> UsageListener<K> for RecordingListener {
        fn on_consumed(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
            self.events
                .lock()
                .push(("consumed", limit.resource.to_string(), format!("{:?}", key), permits));
        }

        fn on_rejected(&self, key: &K, permits: u64, limit: &LimitDescriptor) {
            self.events
                .lock()
                .push(("rejected", limit.resource.to_string(), format!("{:?}", key), permits));
        }
    }

    fn descriptor() -> LimitDescriptor {
        LimitDescriptor {
            resource: Arc::from("api"),
            rates: Rates::none(),
        }
    }

    #[test]
    fn test_listeners_fan_out_in_order() {
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        let listeners: Listeners<u32> =
            Listeners::new(vec![first.clone() as Arc<dyn UsageListener<u32>>, second.clone()]);
        assert_eq!(listeners.len(), 2);

        listeners.on_consumed(&7, 1, &descriptor());
        listeners.on_rejected(&7, 1, &descriptor());

        for recorder in [&first, &second] {
            assert_eq!(recorder.consumptions(), 1);
            assert_eq!(recorder.rejections(), 1);
        }
    }

    #[test]
    fn test_tracing_listener_accepts_any_debug_key() {
        let listener = TracingListener;
        UsageListener::<&str>::on_consumed(&listener, &"alice", 2, &descriptor());
        UsageListener::<&str>::on_rejected(&listener, &"alice", 2, &descriptor());
    }
}
