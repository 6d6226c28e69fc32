//! Cache entries.

use std::time::Duration;

use tokio::time::Instant;

/// A resolved provider value and the instant it was written.
///
/// Entries are never mutated: a refresh builds a new one. `written_at` is
/// when the cache stored the value, not when the upstream data was effective.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    value: T,
    written_at: Instant,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(value: T, written_at: Instant) -> Self {
        Self { value, written_at }
    }

    /// The cached value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the entry was written.
    pub fn written_at(&self) -> Instant {
        self.written_at
    }

    /// Time elapsed between the write and `now` (zero if `now` is earlier).
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.written_at)
    }

    /// Time elapsed since the write.
    pub fn age(&self) -> Duration {
        self.age_at(Instant::now())
    }

    /// Consumes the entry, returning its value.
    pub fn into_value(self) -> T {
        self.value
    }
}
