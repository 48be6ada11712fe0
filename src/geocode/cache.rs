use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::types::geo::Coordinate;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

struct CachedCoordinate {
    coords: Coordinate,
    last_used: AtomicU64,
}

/// Geocode results keyed by normalized query, evicting the least recently
/// used entry once `capacity` is reached.
pub struct GeocodeCache {
    entries: DashMap<String, CachedCoordinate>,
    capacity: usize,
    clock: AtomicU64,
}

impl GeocodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    fn next_stamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> Option<Coordinate> {
        let entry = self.entries.get(key)?;
        entry.last_used.store(self.next_stamp(), Ordering::Relaxed);
        Some(entry.coords)
    }

    pub fn insert(&self, key: String, coords: Coordinate) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_least_recent();
        }
        self.entries.insert(
            key,
            CachedCoordinate {
                coords,
                last_used: AtomicU64::new(self.next_stamp()),
            },
        );
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::debug!("Evicted geocode cache entry \"{}\"", key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
