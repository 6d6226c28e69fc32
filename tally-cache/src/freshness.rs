//! Freshness policy.

use std::time::Duration;

use tokio::time::Instant;

use crate::entry::CacheEntry;

/// Decides whether `entry` may be served at `now` without a refresh.
///
/// Absent entries and a disabled TTL (`None`) are never fresh. Otherwise the
/// entry is fresh while its age is strictly below `ttl`.
pub fn is_fresh<T>(entry: Option<&CacheEntry<T>>, ttl: Option<Duration>, now: Instant) -> bool {
    match (entry, ttl) {
        (Some(entry), Some(ttl)) => entry.age_at(now) < ttl,
        _ => false,
    }
}
