//! Insertion-order eviction.

use tracing::debug;

use crate::store::EntryStore;

/// Prunes `store` down to `max_entries`, oldest-inserted first.
///
/// Runs after every successful write. `None` disables the bound. Returns the
/// evicted keys.
pub fn evict<T: Clone>(store: &EntryStore<T>, max_entries: Option<usize>) -> Vec<String> {
    let Some(max_entries) = max_entries else {
        return Vec::new();
    };

    let evicted = store.evict_to(max_entries);
    for key in &evicted {
        debug!(key = %key, max_entries, "Evicted oldest cache entry");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use proptest::prelude::*;

    #[test]
    fn test_evicts_first_inserted() {
        let store = EntryStore::new();
        store.put("A", 1);
        store.put("B", 2);
        store.put("C", 3);

        assert_eq!(evict(&store, Some(2)), vec!["A"]);
        assert!(store.get("A").is_none());
        assert_eq!(store.keys_oldest_first(), vec!["B", "C"]);
    }

    #[test]
    fn test_refreshed_key_is_not_oldest() {
        let store = EntryStore::new();
        store.put("A", 1);
        store.put("B", 2);
        store.put("A", 11);
        store.put("C", 3);

        assert_eq!(evict(&store, Some(2)), vec!["B"]);
        assert!(store.get("A").is_some());
    }

    #[test]
    fn test_disabled_bound_is_noop() {
        let store = EntryStore::new();
        for i in 0..10 {
            store.put(&i.to_string(), i);
        }
        assert!(evict(&store, None).is_empty());
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_concurrent_evictions_stop_at_bound() {
        for _ in 0..200 {
            let store = Arc::new(EntryStore::new());
            for i in 0..40 {
                store.put(&format!("k{i:02}"), i);
            }

            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        evict(&store, Some(20))
                    })
                })
                .collect();

            let mut evicted: Vec<String> = handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect();
            evicted.sort();

            assert_eq!(store.len(), 20);
            let expected: Vec<String> = (0..20).map(|i| format!("k{i:02}")).collect();
            assert_eq!(evicted, expected);
            assert_eq!(store.keys_oldest_first().first().map(String::as_str), Some("k20"));
        }
    }

    proptest! {
        #[test]
        fn prop_size_bounded_after_every_put(
            keys in proptest::collection::vec(0u8..32, 1..200),
            max in 1usize..16,
        ) {
            let store = EntryStore::new();
            for key in keys {
                store.put(&key.to_string(), key);
                evict(&store, Some(max));
                prop_assert!(store.len() <= max);
            }
        }

        #[test]
        fn prop_m_plus_one_distinct_puts_drop_first(m in 1usize..32) {
            let store = EntryStore::new();
            for i in 0..=m {
                store.put(&format!("k{i}"), i);
                evict(&store, Some(m));
            }
            prop_assert!(store.get("k0").is_none());
            for i in 1..=m {
                let key = format!("k{i}");
                prop_assert!(store.get(&key).is_some());
            }
        }
    }
}
