//! Insertion-ordered entry store.

use lru::LruCache;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::entry::CacheEntry;

/// Key → entry map that remembers insertion order.
///
/// The underlying `LruCache` is used as a plain linked hash map: reads go
/// through `peek` so they never reorder, and `put` on an existing key moves it
/// to the newest slot. The oldest-inserted entry is therefore always at the
/// LRU end and can be removed in O(1).
///
/// Thread-safe; every method takes `&self`.
pub struct EntryStore<T> {
    entries: RwLock<LruCache<String, CacheEntry<T>>>,
}

impl<T: Clone> EntryStore<T> {
    /// Creates an empty, unbounded store. Size is enforced by [`evict`](crate::evict).
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(LruCache::unbounded()),
        }
    }

    /// Returns a copy of the entry for `key`, if any. Does not affect ordering.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.read().peek(key).cloned()
    }

    /// Stores `value` stamped with the current instant and returns the new entry.
    ///
    /// An existing entry for `key` is replaced and the key becomes the newest.
    pub fn put(&self, key: &str, value: T) -> CacheEntry<T> {
        self.put_at(key, value, Instant::now())
    }

    pub(crate) fn put_at(&self, key: &str, value: T, now: Instant) -> CacheEntry<T> {
        let entry = CacheEntry::new(value, now);
        self.entries.write().put(key.to_string(), entry.clone());
        entry
    }

    /// Removes the entry for `key`, returning it.
    pub fn remove(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.write().pop(key)
    }

    /// Removes and returns the oldest-inserted entry.
    pub fn pop_oldest(&self) -> Option<(String, CacheEntry<T>)> {
        self.entries.write().pop_lru()
    }

    /// Pops oldest-inserted entries until at most `max` remain.
    ///
    /// The size check and every removal happen under one write lock, so
    /// concurrent callers never remove more than the overflow between them.
    /// Returns the removed keys, oldest first.
    pub fn evict_to(&self, max: usize) -> Vec<String> {
        let mut entries = self.entries.write();
        let mut evicted = Vec::new();
        while entries.len() > max {
            match entries.pop_lru() {
                Some((key, _)) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys from oldest-inserted to newest.
    pub fn keys_oldest_first(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns true if an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains(key)
    }
}

impl<T: Clone> Default for EntryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
