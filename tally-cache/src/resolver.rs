//! Single-key resolution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, instrument, warn, Instrument};

use tally_core::error::{Result, TallyError};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::eviction::evict;
use crate::freshness::is_fresh;
use crate::inflight::{InFlightRegistry, PendingResolution, RegistrationGuard, Role};
use crate::store::EntryStore;

/// A value handed back by the cache, with how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved<T> {
    /// The value (an owned copy; never aliases cached state)
    pub value: T,
    /// Served from a fresh entry without calling the provider
    pub cache_hit: bool,
    /// Served from an expired entry because the refresh failed
    pub stale: bool,
    /// Time since the value was written to the cache; zero when just fetched
    pub age: Duration,
}

impl<T: Clone> Resolved<T> {
    pub(crate) fn hit(entry: &CacheEntry<T>, now: Instant) -> Self {
        Self {
            value: entry.value().clone(),
            cache_hit: true,
            stale: false,
            age: entry.age_at(now),
        }
    }

    pub(crate) fn stale(entry: CacheEntry<T>, now: Instant) -> Self {
        let age = entry.age_at(now);
        Self {
            value: entry.into_value(),
            cache_hit: false,
            stale: true,
            age,
        }
    }

    pub(crate) fn fetched(value: T) -> Self {
        Self {
            value,
            cache_hit: false,
            stale: false,
            age: Duration::ZERO,
        }
    }

    /// Age in whole milliseconds.
    pub fn age_ms(&self) -> u64 {
        u64::try_from(self.age.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Cache instance name
    pub name: String,
    /// Stored entries (fresh and stale)
    pub entries: usize,
    /// Provider calls currently running
    pub in_flight: usize,
    /// Size bound, if eviction is enabled
    pub capacity: Option<usize>,
    /// Configured freshness window in milliseconds
    pub ttl_ms: i64,
}

/// Request-coalescing TTL cache for one kind of provider call.
///
/// Build one per semantic resource and share it (it is cheap to put behind an
/// `Arc`). Instances never share state with each other.
///
/// Provider calls run on spawned tokio tasks, so [`resolve`](Self::resolve)
/// must be called from within a tokio runtime. A caller that stops waiting
/// does not cancel the call; joiners still get its result and a success is
/// still cached.
pub struct ProviderCache<T: Clone + Send + Sync + 'static> {
    name: String,
    config: CacheConfig,
    store: Arc<EntryStore<T>>,
    in_flight: Arc<InFlightRegistry<T>>,
}

impl<T: Clone + Send + Sync + 'static> ProviderCache<T> {
    /// Creates an empty cache. `name` shows up in logs and stats.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            store: Arc::new(EntryStore::new()),
            in_flight: Arc::new(InFlightRegistry::new()),
        }
    }

    /// Cache instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a copy of the stored entry for `key`, fresh or not.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get(key)
    }

    /// Resolves `key`, calling `provider` only if no fresh entry exists and no
    /// call for `key` is already running.
    ///
    /// 1. A fresh entry is returned immediately (`cache_hit`), without suspending.
    /// 2. Otherwise the caller joins the running call for `key`, if any.
    /// 3. Otherwise the caller becomes the leader: the call is registered, then
    ///    spawned. On success the value is stored and the cache pruned; on
    ///    failure the store is left untouched. Either way the registration is
    ///    released and every waiter gets the same outcome.
    ///
    /// Provider errors are passed through unchanged; nothing is retried.
    #[instrument(skip(self, provider), fields(cache = %self.name))]
    pub async fn resolve<F, Fut>(&self, key: &str, provider: F) -> Result<Resolved<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(hit) = self.fresh_hit(key) {
            return Ok(hit);
        }
        self.join_or_start(key, provider).await
    }

    /// Returns the entry for `key` as a hit if it is fresh now.
    fn fresh_hit(&self, key: &str) -> Option<Resolved<T>> {
        let now = Instant::now();
        let entry = self.store.get(key)?;
        if !is_fresh(Some(&entry), self.config.ttl(), now) {
            return None;
        }
        debug!(age_ms = entry.age_at(now).as_millis() as u64, "Cache hit");
        Some(Resolved::hit(&entry, now))
    }

    /// Joins the running call for `key` or starts one.
    ///
    /// Freshness is checked again under the registry lock: a leader that
    /// finished after the caller's first check has already stored its value,
    /// and that value is served instead of starting a second call.
    pub(crate) async fn join_or_start<F, Fut>(
        &self,
        key: &str,
        provider: F,
    ) -> Result<Resolved<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let claimed = self
            .in_flight
            .try_join_or_register(key, || match self.fresh_hit(key) {
                Some(hit) => Err(hit),
                None => Ok(self.start_resolution(key, provider())),
            });
        let (pending, role) = match claimed {
            Ok(claimed) => claimed,
            Err(hit) => return Ok(hit),
        };

        match role {
            Role::Leader => debug!("Cache miss, calling provider"),
            Role::Joiner => debug!("Joined in-flight resolution"),
        }

        pending.await.map(Resolved::fetched)
    }

    /// Spawns the provider call and returns the handle waiters share.
    ///
    /// Called with the key's registry shard locked; the spawned task takes the
    /// same lock to release the slot, so it cannot do so before the caller has
    /// finished registering.
    fn start_resolution<Fut>(&self, key: &str, call: Fut) -> PendingResolution<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let guard = RegistrationGuard::new(self.in_flight.clone(), key);
        let store = self.store.clone();
        let capacity = self.config.capacity();
        let owned_key = key.to_string();

        let task = async move {
            let result = call.await;
            match &result {
                Ok(value) => {
                    store.put(&owned_key, value.clone());
                    evict(&store, capacity);
                    debug!("Stored provider result");
                }
                Err(err) => warn!(error = %err, "Provider call failed"),
            }
            // Release the slot before publishing: later callers either see
            // the new entry or start a call of their own.
            drop(guard);
            sender.send(result).ok();
        };
        tokio::spawn(task.instrument(tracing::debug_span!("provider_call", cache = %self.name, key)));

        let name = self.name.clone();
        receiver
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(TallyError::Cancelled(format!(
                        "{name} provider call ended without a result"
                    )))
                })
            })
            .boxed()
            .shared()
    }

    /// Drops the entry for `key`. Returns true if one existed.
    ///
    /// A call already running for `key` is not affected and will store its
    /// result when it completes.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            debug!(cache = %self.name, key, "Invalidated cache entry");
        }
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.store.clear();
        debug!(cache = %self.name, "Cleared cache");
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.clone(),
            entries: self.store.len(),
            in_flight: self.in_flight.len(),
            capacity: self.config.capacity(),
            ttl_ms: self.config.ttl_ms,
        }
    }

    pub(crate) fn ttl(&self) -> Option<Duration> {
        self.config.ttl()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &EntryStore<T> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{advance, sleep};

    fn counting_provider(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay: Duration,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<u32>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing_provider(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<u32>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TallyError::rate_limited("test"))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served_without_provider() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .resolve("AAPL", counting_provider(&calls, 7, Duration::ZERO))
            .await
            .unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.value, 7);

        advance(Duration::from_millis(400)).await;

        let second = cache
            .resolve("AAPL", counting_provider(&calls, 99, Duration::ZERO))
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.value, 7);
        assert!(second.age >= Duration::from_millis(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_path_does_not_suspend() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        cache.store().put("AAPL", 1u32);

        let mut resolve = tokio_test::task::spawn(
            cache.resolve("AAPL", || async { Ok::<u32, TallyError>(2) }.boxed()),
        );
        let resolved = tokio_test::assert_ready!(resolve.poll()).unwrap();
        assert!(resolved.cache_hit);
        assert_eq!(resolved.value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_stored_after_first_check_is_served() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        // A leader stored AAPL and released its slot after this caller missed.
        cache.store().put("AAPL", 8u32);

        let resolved = cache
            .join_or_start("AAPL", counting_provider(&calls, 9, Duration::ZERO))
            .await
            .unwrap();
        assert!(resolved.cache_hit);
        assert_eq!(resolved.value, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refreshed() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .resolve("AAPL", counting_provider(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        advance(Duration::from_millis(1000)).await;

        let refreshed = cache
            .resolve("AAPL", counting_provider(&calls, 2, Duration::ZERO))
            .await
            .unwrap();
        assert!(!refreshed.cache_hit);
        assert_eq!(refreshed.value, 2);
        assert_eq!(cache.peek("AAPL").map(|e| *e.value()), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_call() {
        let cache = Arc::new(ProviderCache::new("test", CacheConfig::new(1000, 10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            let provider = counting_provider(&calls, 42 + i, Duration::from_millis(200));
            handles.push(tokio::spawn(async move {
                cache.resolve("AAPL", provider).await
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap().value);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| *v == values[0]));
        assert!(cache.stats().in_flight == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_gets_leader_result() {
        let cache = Arc::new(ProviderCache::new("quotes", CacheConfig::new(1000, 10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = cache.clone();
            let provider = counting_provider(&calls, 190, Duration::from_millis(200));
            tokio::spawn(async move { cache.resolve("AAPL", provider).await })
        };
        sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.stats().in_flight, 1);

        let joiner = cache
            .resolve("AAPL", counting_provider(&calls, 999, Duration::ZERO))
            .await
            .unwrap();
        let leader = leader.await.unwrap().unwrap();

        assert_eq!(leader.value, 190);
        assert_eq!(joiner.value, 190);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter_and_writes_nothing() {
        let cache = Arc::new(ProviderCache::<u32>::new("test", CacheConfig::new(1000, 10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_failure = {
            let calls = calls.clone();
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(100)).await;
                    Err::<u32, _>(TallyError::Timeout { seconds: 10 })
                }
                .boxed()
            }
        };

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve("AAPL", slow_failure).await })
        };
        sleep(Duration::from_millis(5)).await;
        let joined = cache.resolve("AAPL", failing_provider(&calls)).await;

        assert_eq!(joined, Err(TallyError::Timeout { seconds: 10 }));
        assert_eq!(leader.await.unwrap(), Err(TallyError::Timeout { seconds: 10 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.peek("AAPL").is_none());
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_released_after_failure_allows_retry() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(cache.resolve("AAPL", failing_provider(&calls)).await.is_err());
        let retried = cache
            .resolve("AAPL", counting_provider(&calls, 5, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(retried.value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_stale_entry() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .resolve("AAPL", counting_provider(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        advance(Duration::from_secs(2)).await;

        assert!(cache.resolve("AAPL", failing_provider(&calls)).await.is_err());
        assert_eq!(cache.peek("AAPL").map(|e| *e.value()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    #[allow(unreachable_code)]
    async fn test_panicking_provider_is_reported_as_cancelled() {
        let cache = ProviderCache::<u32>::new("test", CacheConfig::new(1000, 10));

        let exploding = || {
            async {
                panic!("provider blew up");
                Ok::<u32, TallyError>(0)
            }
            .boxed()
        };
        let result = cache.resolve("AAPL", exploding).await;

        assert!(matches!(result, Err(TallyError::Cancelled(_))));
        assert_eq!(cache.stats().in_flight, 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_ttl_calls_provider_every_time() {
        let cache = ProviderCache::new("test", CacheConfig::new(0, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let resolved = cache
                .resolve("AAPL", counting_provider(&calls, 3, Duration::ZERO))
                .await
                .unwrap();
            assert!(!resolved.cache_hit);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_ttl_still_dedups_overlapping_calls() {
        let cache = Arc::new(ProviderCache::new("test", CacheConfig::new(-1, 10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let cache = cache.clone();
            let provider = counting_provider(&calls, 1, Duration::from_millis(50));
            tokio::spawn(async move { cache.resolve("AAPL", provider).await })
        };
        sleep(Duration::from_millis(1)).await;
        let second = cache
            .resolve("AAPL", counting_provider(&calls, 2, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(first.await.unwrap().unwrap().value, 1);
        assert_eq!(second.value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_scenario() {
        let cache = ProviderCache::new("test", CacheConfig::new(1000, 2));
        let calls = Arc::new(AtomicUsize::new(0));

        for (key, value) in [("A", 1), ("B", 2), ("C", 3)] {
            cache
                .resolve(key, counting_provider(&calls, value, Duration::ZERO))
                .await
                .unwrap();
            advance(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.peek("A").is_none());

        advance(Duration::from_millis(470)).await;
        let b = cache
            .resolve("B", counting_provider(&calls, 20, Duration::ZERO))
            .await
            .unwrap();
        assert!(b.cache_hit);
        assert_eq!(b.value, 2);

        advance(Duration::from_millis(100)).await;
        assert!(cache.resolve("A", failing_provider(&calls)).await.is_err());
        assert_eq!(cache.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache = ProviderCache::new("test", CacheConfig::new(60_000, 10));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .resolve("AAPL", counting_provider(&calls, 1, Duration::ZERO))
            .await
            .unwrap();
        assert!(cache.invalidate("AAPL"));
        assert!(!cache.invalidate("AAPL"));

        let refetched = cache
            .resolve("AAPL", counting_provider(&calls, 2, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(refetched.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
