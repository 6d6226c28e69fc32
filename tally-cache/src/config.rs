//! Per-instance cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache configuration.
///
/// Both knobs use "non-positive disables" semantics so they can be fed
/// straight from environment integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in milliseconds; `<= 0` makes every lookup a miss
    pub ttl_ms: i64,
    /// Maximum number of entries; `<= 0` disables eviction
    pub max_entries: i64,
}

impl CacheConfig {
    /// Creates a configuration.
    pub fn new(ttl_ms: i64, max_entries: i64) -> Self {
        Self { ttl_ms, max_entries }
    }

    /// Returns the freshness window, or `None` when freshness is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Returns the size bound, or `None` when eviction is disabled.
    pub fn capacity(&self) -> Option<usize> {
        usize::try_from(self.max_entries).ok().filter(|n| *n > 0)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            max_entries: 1000,
        }
    }
}
