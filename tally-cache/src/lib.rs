//! # Tally Cache
//!
//! Request-coalescing TTL cache for upstream provider calls.
//!
//! One [`ProviderCache`] instance is built per semantic resource (live
//! quotes, daily history, LLM completions). Each instance owns:
//!
//! - an insertion-ordered [`EntryStore`] bounded by `max_entries`,
//! - an [`InFlightRegistry`] that lets at most one provider call run per key,
//! - its [`CacheConfig`].
//!
//! Lookups are freshness-first: a fresh entry is returned without suspending;
//! otherwise the caller joins the in-flight resolution for the key or starts
//! one. Batches resolve keys independently and fall back to stale entries when
//! a refresh fails.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tally_cache::{CacheConfig, ProviderCache};
//!
//! let quotes = ProviderCache::<Quote>::new("quotes", CacheConfig::new(60_000, 500));
//! let resolved = quotes.resolve("AAPL", || async move { source.quote("AAPL").await }).await?;
//! println!("{} (hit: {})", resolved.value.price, resolved.cache_hit);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod batch;
mod config;
mod entry;
mod eviction;
mod freshness;
mod inflight;
mod resolver;
mod store;

pub use batch::{BatchOutcome, KeyFailure};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use eviction::evict;
pub use freshness::is_fresh;
pub use inflight::{InFlightRegistry, PendingResolution, Role};
pub use resolver::{CacheStats, ProviderCache, Resolved};
pub use store::EntryStore;
