//! Multi-key resolution with per-key failure isolation.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use tally_core::error::{Result, TallyError};

use crate::freshness::is_fresh;
use crate::resolver::{ProviderCache, Resolved};

/// One key that could not be refreshed.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyFailure {
    /// The key
    pub key: String,
    /// What the provider (or the cache) reported
    pub error: TallyError,
}

/// Result of [`ProviderCache::resolve_many`].
#[derive(Clone, Debug)]
pub struct BatchOutcome<T> {
    /// Usable value per key, including stale fallbacks (see [`Resolved::stale`])
    pub results: HashMap<String, Resolved<T>>,
    /// Keys served from a fresh entry without a provider call
    pub hits: BTreeSet<String>,
    /// Keys whose refresh failed, in key order; a key may also appear in
    /// `results` when a stale value was available
    pub failures: Vec<KeyFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
            hits: BTreeSet::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Returns true if at least one key failed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Keys answered with a stale fallback, sorted.
    pub fn stale_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .results
            .iter()
            .filter(|(_, resolved)| resolved.stale)
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl<T: Clone + Send + Sync + 'static> ProviderCache<T> {
    /// Resolves a set of independent keys.
    ///
    /// Keys are de-duplicated, then each is resolved as by
    /// [`resolve`](Self::resolve), concurrently. A key whose refresh fails
    /// falls back to its stale entry when one existed at the start of the
    /// batch; it is then reported in both `results` (marked `stale`) and
    /// `failures`.
    ///
    /// # Errors
    ///
    /// - `EmptyBatch` / `BatchTooLarge` before any provider call when the
    ///   distinct key count is zero or above `max_batch_size`.
    /// - The first failure (in key order) when no key produced a usable value.
    #[instrument(skip(self, keys, provider), fields(cache = %self.name()))]
    pub async fn resolve_many<I, P, Fut>(
        &self,
        keys: I,
        provider: P,
        max_batch_size: usize,
    ) -> Result<BatchOutcome<T>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        P: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let keys: BTreeSet<String> = keys
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .collect();

        if keys.is_empty() {
            return Err(TallyError::EmptyBatch);
        }
        if keys.len() > max_batch_size {
            return Err(TallyError::BatchTooLarge {
                max: max_batch_size,
                actual: keys.len(),
            });
        }

        let now = Instant::now();
        let ttl = self.ttl();
        let provider = &provider;
        let mut outcome = BatchOutcome::default();
        let mut pending = Vec::new();

        for key in keys {
            let entry = self.peek(&key);
            if is_fresh(entry.as_ref(), ttl, now) {
                if let Some(entry) = entry {
                    outcome.results.insert(key.clone(), Resolved::hit(&entry, now));
                    outcome.hits.insert(key);
                    continue;
                }
            }

            // Present but expired: kept as the fallback if the refresh fails.
            let fallback = entry;
            pending.push(async move {
                let result = self.resolve(&key, || provider(key.clone())).await;
                (key, fallback, result)
            });
        }

        let requested = pending.len();
        for (key, fallback, result) in join_all(pending).await {
            match result {
                Ok(resolved) => {
                    if resolved.cache_hit {
                        outcome.hits.insert(key.clone());
                    }
                    outcome.results.insert(key, resolved);
                }
                Err(error) => {
                    if let Some(entry) = fallback {
                        warn!(key = %key, error = %error, "Refresh failed, serving stale value");
                        outcome
                            .results
                            .insert(key.clone(), Resolved::stale(entry, Instant::now()));
                    } else {
                        debug!(key = %key, error = %error, "Refresh failed with no fallback");
                    }
                    outcome.failures.push(KeyFailure { key, error });
                }
            }
        }

        info!(
            hits = outcome.hits.len(),
            refreshed = requested,
            failures = outcome.failures.len(),
            "Batch resolved"
        );

        if outcome.results.is_empty() {
            if let Some(first) = outcome.failures.first() {
                return Err(first.error.clone());
            }
        }

        Ok(outcome)
    }
}
