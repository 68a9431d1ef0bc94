//! Storage of live bandwidths, keyed per resource and request key.
//!
//! The engine keeps no admission state of its own: every limiter reads and
//! writes its [`Bandwidths`] through a [`BandwidthStore`], so state can live
//! in process memory or in a cache shared with other processes.
//!
//! Stores hold values, not handles. A limiter reserves through
//! [`BandwidthStore::update`], which applies the change and persists the
//! result before returning.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::bandwidth::Bandwidths;
use crate::error::Result;

/// Key → bandwidths persistence.
pub trait BandwidthStore<K>: Send + Sync + Debug {
    /// Get a copy of the bandwidths stored for `key`.
    fn get(&self, key: &K) -> Option<Bandwidths>;

    /// Store bandwidths for `key`, replacing any previous entry.
    fn put(&self, key: K, bandwidths: Bandwidths);

    /// Apply `update` to the bandwidths for `key` and store the result,
    /// creating them with `create` first if absent.
    ///
    /// The default implementation is a plain get, update, put: concurrent
    /// updates of one key may overwrite each other. Implementations shared
    /// between threads should serialize updates per key.
    fn update(
        &self,
        key: K,
        create: &mut dyn FnMut() -> Result<Bandwidths>,
        update: &mut dyn FnMut(&mut Bandwidths),
    ) -> Result<()> {
        let mut bandwidths = match self.get(&key) {
            Some(existing) => existing,
            None => create()?,
        };
        update(&mut bandwidths);
        self.put(key, bandwidths);
        Ok(())
    }
}

/// In-process store backed by DashMap.
///
/// Each key owns a mutex, so updates of one key are serialized and unrelated
/// keys never contend.
#[derive(Debug)]
pub struct InMemoryBandwidthStore<K>
where
    K: Eq + Hash,
{
    map: DashMap<K, Arc<Mutex<Bandwidths>>>,
}

impl<K> InMemoryBandwidthStore<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Get the number of stored keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all stored state.
    pub fn clear(&self) {
        self.map.clear();
    }

    fn slot(&self, key: K, create: &mut dyn FnMut() -> Result<Bandwidths>) -> Result<Arc<Mutex<Bandwidths>>> {
        if let Some(existing) = self.map.get(&key) {
            return Ok(existing.value().clone());
        }
        match self.map.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let created = Arc::new(Mutex::new(create()?));
                entry.insert(created.clone());
                Ok(created)
            }
        }
    }
}

impl<K> Default for InMemoryBandwidthStore<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> BandwidthStore<K> for InMemoryBandwidthStore<K>
where
    K: Eq + Hash + Send + Sync + Debug,
{
    fn get(&self, key: &K) -> Option<Bandwidths> {
        let slot = self.map.get(key)?.value().clone();
        let bandwidths = slot.lock().clone();
        Some(bandwidths)
    }

    fn put(&self, key: K, bandwidths: Bandwidths) {
        match self.map.entry(key) {
            Entry::Occupied(entry) => *entry.get().lock() = bandwidths,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(bandwidths)));
            }
        }
    }

    fn update(
        &self,
        key: K,
        create: &mut dyn FnMut() -> Result<Bandwidths>,
        update: &mut dyn FnMut(&mut Bandwidths),
    ) -> Result<()> {
        let slot = self.slot(key, create)?;
        update(&mut *slot.lock());
        Ok(())
    }
}

/// Minimal contract of an external cache.
///
/// Implement this for a distributed or shared cache client to let several
/// limiters, or several processes, see the same bandwidths. Values go in and
/// come out as copies; [`Bandwidths`] is serde-serializable for caches that
/// store bytes.
pub trait Cache<K, V>: Send + Sync + Debug {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
}

impl<K, V> Cache<K, V> for DashMap<K, V>
where
    K: Eq + Hash + Send + Sync + Debug,
    V: Clone + Send + Sync + Debug,
{
    fn get(&self, key: &K) -> Option<V> {
        DashMap::get(self, key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K, V, C> Cache<K, V> for Arc<C>
where
    C: Cache<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn put(&self, key: K, value: V) {
        (**self).put(key, value);
    }
}

/// Store adapter over any [`Cache`].
///
/// Every update reads the cached bandwidths, applies the reservation and
/// writes the result back, holding a per-key lock for the duration. The lock
/// is local to this adapter: adapters in other processes sharing the cache
/// are not serialized against it.
#[derive(Debug)]
pub struct CacheBandwidthStore<K, C>
where
    K: Eq + Hash,
{
    cache: C,
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K, C> CacheBandwidthStore<K, C>
where
    K: Eq + Hash,
{
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

impl<K, C> BandwidthStore<K> for CacheBandwidthStore<K, C>
where
    K: Clone + Eq + Hash + Send + Sync + Debug,
    C: Cache<K, Bandwidths>,
{
    fn get(&self, key: &K) -> Option<Bandwidths> {
        self.cache.get(key)
    }

    fn put(&self, key: K, bandwidths: Bandwidths) {
        self.cache.put(key, bandwidths);
    }

    fn update(
        &self,
        key: K,
        create: &mut dyn FnMut() -> Result<Bandwidths>,
        update: &mut dyn FnMut(&mut Bandwidths),
    ) -> Result<()> {
        let lock = self.locks.entry(key.clone()).or_default().value().clone();
        let _guard = lock.lock();

        let mut bandwidths = match self.cache.get(&key) {
            Some(existing) => existing,
            None => create()?,
        };
        update(&mut bandwidths);
        self.cache.put(key, bandwidths);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fmt::Display;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::bandwidth::BandwidthFactory;
    use crate::rate::{Rate, Rates};

    /// Cache that keeps bandwidths only as JSON text.
    #[derive(Debug, Default)]
    pub(crate) struct JsonCache {
        pub entries: DashMap<String, String>,
        pub puts: AtomicUsize,
    }

    impl<K: Display> Cache<K, Bandwidths> for JsonCache {
        fn get(&self, key: &K) -> Option<Bandwidths> {
            let json = self.entries.get(&key.to_string())?;
            serde_json::from_str(json.value()).ok()
        }

        fn put(&self, key: K, value: Bandwidths) {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let json = serde_json::to_string(&value).unwrap();
            self.entries.insert(key.to_string(), json);
        }
    }

    fn create_bandwidths() -> Result<Bandwidths> {
        BandwidthFactory::default().create_all(&Rates::of(Rate::per_second(1)), 0)
    }

    fn acquire(store: &dyn BandwidthStore<String>, key: &str) -> bool {
        let mut granted = false;
        store
            .update(key.to_string(), &mut create_bandwidths, &mut |b| {
                granted = b.try_acquire(1, Duration::ZERO, 0);
            })
            .unwrap();
        granted
    }

    #[test]
    fn test_in_memory_update_reuses_state() {
        let store: InMemoryBandwidthStore<String> = InMemoryBandwidthStore::new();
        assert!(acquire(&store, "k"));
        assert!(!acquire(&store, "k"));
        assert!(acquire(&store, "other"));
        assert_eq!(store.len(), 2);

        // Copies do not alias the stored state
        let mut copy = BandwidthStore::get(&store, &"other".to_string()).unwrap();
        assert!(!copy.try_acquire(1, Duration::ZERO, 0));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_replaces_state() {
        let store: InMemoryBandwidthStore<String> = InMemoryBandwidthStore::new();
        assert!(acquire(&store, "k"));
        store.put("k".to_string(), create_bandwidths().unwrap());
        assert!(acquire(&store, "k"));
    }

    #[test]
    fn test_create_failure_stores_nothing() {
        let store: InMemoryBandwidthStore<String> = InMemoryBandwidthStore::new();
        let mut failing = || -> Result<Bandwidths> {
            Err(crate::error::RateTreeError::UnknownAlgorithm("nope".to_string()))
        };
        let result = store.update("k".to_string(), &mut failing, &mut |_| {});
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_cache_adapter_writes_back() {
        let store = CacheBandwidthStore::new(JsonCache::default());

        assert!(acquire(&store, "k"));
        assert!(!acquire(&store, "k"));
        assert_eq!(store.cache().puts.load(Ordering::SeqCst), 2);
        assert!(store.cache().entries.contains_key("k"));
    }

    #[test]
    fn test_adapters_share_cached_state() {
        let cache = Arc::new(JsonCache::default());
        let first = CacheBandwidthStore::new(cache.clone());
        let second = CacheBandwidthStore::new(cache.clone());

        assert!(acquire(&first, "k"));
        assert!(!acquire(&second, "k"));
        assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_update_writes_back() {
        #[derive(Debug, Default)]
        struct PlainStore(DashMap<String, Bandwidths>);

        impl BandwidthStore<String> for PlainStore {
            fn get(&self, key: &String) -> Option<Bandwidths> {
                self.0.get(key).map(|e| e.value().clone())
            }

            fn put(&self, key: String, bandwidths: Bandwidths) {
                self.0.insert(key, bandwidths);
            }
        }

        let store = PlainStore::default();
        assert!(acquire(&store, "k"));
        assert!(!acquire(&store, "k"));
    }

    #[test]
    fn test_dashmap_as_cache() {
        let store = CacheBandwidthStore::new(DashMap::<String, Bandwidths>::new());
        assert!(BandwidthStore::get(&store, &"k".to_string()).is_none());

        assert!(acquire(&store, "k"));
        assert!(!acquire(&store, "k"));
        assert!(BandwidthStore::get(&store, &"k".to_string()).is_some());
    }
}
