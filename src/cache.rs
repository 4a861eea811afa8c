//! Time-expiring caches shared across solve calls.
//!
//! [`TtlCache`] is the only cross-call shared state in the engine. Values are
//! stored behind `Arc` and replaced wholesale, so a reader either sees the
//! old value or the new one, never a partial write. Capacity overflow evicts
//! in insertion order (FIFO); re-inserting a key counts as a fresh insertion.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fxhash::{FxHashMap, FxHasher64};
use parking_lot::RwLock;
use tracing::debug;

use crate::traits::{GeocodedAddress, Geocoder, Location, MatrixElement, MatrixResponse, TravelOptions};

/// Source of "now" for expiry checks, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<V> {
    value: Arc<V>,
    /// `None` when `now + ttl` does not fit in an `Instant`.
    expires_at: Option<Instant>,
    seq: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

struct Slots<K, V> {
    map: FxHashMap<K, Entry<V>>,
    /// Insertion log; stale (key, seq) pairs are skipped on eviction.
    order: VecDeque<(K, u64)>,
    next_seq: u64,
}

/// Bounded key-value store whose entries vanish after a time-to-live.
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: RwLock<Slots<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            ttl,
            clock,
            slots: RwLock::new(Slots {
                map: FxHashMap::default(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Returns the live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = self.clock.now();
        let slots = self.slots.read();
        slots
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Stores `value` with the cache's default time-to-live.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        self.put(key, value, self.ttl)
    }

    /// Stores `value` under `key`, replacing any previous entry atomically.
    ///
    /// Returns the shared handle that readers will observe.
    pub fn put(&self, key: K, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        if self.capacity == 0 {
            return value;
        }

        let now = self.clock.now();
        let mut guard = self.slots.write();
        let slots = &mut *guard;

        if slots.map.len() >= self.capacity {
            slots.map.retain(|_, entry| entry.is_live(now));
        }

        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.map.insert(
            key.clone(),
            Entry {
                value: Arc::clone(&value),
                expires_at: now.checked_add(ttl),
                seq,
            },
        );
        slots.order.push_back((key, seq));

        while slots.map.len() > self.capacity {
            let Some((oldest, oldest_seq)) = slots.order.pop_front() else {
                break;
            };
            if slots.map.get(&oldest).is_some_and(|entry| entry.seq == oldest_seq) {
                slots.map.remove(&oldest);
                debug!(capacity = self.capacity, "cache full, evicted oldest entry");
            }
        }

        if slots.order.len() > self.capacity.saturating_mul(2) {
            let map = &slots.map;
            slots
                .order
                .retain(|(key, seq)| map.get(key).is_some_and(|entry| entry.seq == *seq));
        }

        value
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut slots = self.slots.write();
        slots.map.clear();
        slots.order.clear();
    }
}

/// Stable hash of a travel-time request.
///
/// Origins and destinations are hashed in sorted order, so permutations of
/// the same block share a key; [`CachedBlock`] remaps them on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn for_request(origins: &[Location], destinations: &[Location], options: &TravelOptions) -> Self {
        let mut hasher = FxHasher64::default();
        hash_sorted(origins, &mut hasher);
        hash_sorted(destinations, &mut hasher);

        options.mode.hash(&mut hasher);
        let mut avoid = options.avoid.clone();
        avoid.sort();
        avoid.dedup();
        avoid.hash(&mut hasher);
        options.units.hash(&mut hasher);
        options.departure_time.hash(&mut hasher);
        options.traffic_model.hash(&mut hasher);

        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

fn hash_sorted<H: Hasher>(locations: &[Location], hasher: &mut H) {
    let mut keys = locations.iter().map(Location::key).collect::<Vec<_>>();
    keys.sort();
    keys.len().hash(hasher);
    for key in keys {
        key.hash(hasher);
    }
}

/// A raw provider response together with the order it was fetched in.
#[derive(Debug, Clone)]
pub struct CachedBlock {
    origins: FxHashMap<String, usize>,
    destinations: FxHashMap<String, usize>,
    response: MatrixResponse,
}

impl CachedBlock {
    pub fn new(origins: &[Location], destinations: &[Location], response: MatrixResponse) -> Self {
        Self {
            origins: index_keys(origins),
            destinations: index_keys(destinations),
            response,
        }
    }

    /// Element for an (origin, destination) pair addressed by [`Location::key`].
    pub fn element(&self, origin: &str, destination: &str) -> Option<&MatrixElement> {
        let row = *self.origins.get(origin)?;
        let col = *self.destinations.get(destination)?;
        self.response.element(row, col)
    }
}

fn index_keys(locations: &[Location]) -> FxHashMap<String, usize> {
    let mut index = FxHashMap::default();
    for (position, location) in locations.iter().enumerate() {
        index.entry(location.key()).or_insert(position);
    }
    index
}

pub type MatrixCache = TtlCache<CacheKey, CachedBlock>;

/// Geocoder wrapper remembering successful lookups.
///
/// Misses are not cached so a transient outage does not stick.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: TtlCache<String, GeocodedAddress>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, cache: TtlCache<String, GeocodedAddress>) -> Self {
        Self { inner, cache }
    }
}

impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    fn resolve(&self, address: &str) -> Option<GeocodedAddress> {
        let key = address.trim().to_string();
        if let Some(hit) = self.cache.get(&key) {
            debug!(address = %key, "geocoding cache hit");
            return Some(GeocodedAddress::clone(&hit));
        }

        let resolved = self.inner.resolve(&key)?;
        self.cache.insert(key, resolved.clone());
        Some(resolved)
    }
}
