//! DTOs for API requests and responses.
//!
//! Bodies are camelCase to match the dashboard's JSON conventions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tally_cache::{CacheStats, KeyFailure, Resolved};
use tally_core::types::{DailyClose, Quote};

// ═══════════════════════════════════════════════════════════════════════════
// Quotes
// ═══════════════════════════════════════════════════════════════════════════

/// Query for the batch quote endpoint.
#[derive(Debug, Deserialize)]
pub struct QuotesQuery {
    /// Comma-separated ticker symbols
    #[serde(default)]
    pub symbols: String,
}

/// Query for the quote detail endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    /// Drop cached data for the symbol before resolving
    #[serde(default)]
    pub refresh: bool,
}

/// A live quote as served to the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDto {
    /// Last traded price
    pub price: f64,
    /// Previous session close
    pub previous_close: f64,
    /// Absolute change against the previous close
    pub change: f64,
    /// Percent change against the previous close
    pub change_percent: Option<f64>,
    /// Quote currency
    pub currency: String,
    /// Listing exchange
    pub exchange: String,
    /// When the upstream priced it
    pub timestamp: DateTime<Utc>,
    /// Served from the cache without an upstream call
    pub cached: bool,
    /// Served from an expired entry because the refresh failed
    pub stale: bool,
    /// Milliseconds since the value was fetched
    pub age_ms: u64,
}

impl From<Resolved<Quote>> for QuoteDto {
    fn from(resolved: Resolved<Quote>) -> Self {
        let age_ms = resolved.age_ms();
        let quote = resolved.value;
        Self {
            price: quote.price,
            previous_close: quote.previous_close,
            change: quote.change(),
            change_percent: quote.change_percent(),
            currency: quote.currency,
            exchange: quote.exchange,
            timestamp: quote.timestamp,
            cached: resolved.cache_hit,
            stale: resolved.stale,
            age_ms,
        }
    }
}

/// A symbol that could not be refreshed.
#[derive(Debug, Serialize)]
pub struct FailureDto {
    /// Ticker symbol
    pub symbol: String,
    /// Error message
    pub error: String,
}

impl From<KeyFailure> for FailureDto {
    fn from(failure: KeyFailure) -> Self {
        Self {
            symbol: failure.key,
            error: failure.error.to_string(),
        }
    }
}

/// Response for the batch quote endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotesResponse {
    /// Usable quotes by symbol (stale ones flagged)
    pub quotes: BTreeMap<String, QuoteDto>,
    /// Symbols answered from a fresh cache entry
    pub cache_hits: Vec<String>,
    /// Symbols whose refresh failed
    pub partial_failures: Vec<FailureDto>,
}

/// Daily closing series as served to the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDto {
    /// Points, oldest first
    pub points: Vec<DailyClose>,
    /// Served from the cache without an upstream call
    pub cached: bool,
    /// Served from an expired entry because the refresh failed
    pub stale: bool,
    /// Milliseconds since the series was fetched
    pub age_ms: u64,
}

impl From<Resolved<Vec<DailyClose>>> for HistoryDto {
    fn from(resolved: Resolved<Vec<DailyClose>>) -> Self {
        Self {
            age_ms: resolved.age_ms(),
            cached: resolved.cache_hit,
            stale: resolved.stale,
            points: resolved.value,
        }
    }
}

/// Response for the quote detail endpoint.
#[derive(Debug, Serialize)]
pub struct QuoteDetailResponse {
    /// Normalized symbol
    pub symbol: String,
    /// Live quote
    pub quote: QuoteDto,
    /// Daily closes
    pub history: HistoryDto,
}

// ═══════════════════════════════════════════════════════════════════════════
// LLM
// ═══════════════════════════════════════════════════════════════════════════

/// Response for a completion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    /// Text, or parsed JSON when a schema was given
    pub result: Value,
    /// Served from the cache without an upstream call
    pub cached: bool,
    /// Milliseconds since the answer was generated
    pub age_ms: u64,
    /// Key to pass to the invalidation endpoint
    pub cache_key: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Cache administration
// ═══════════════════════════════════════════════════════════════════════════

/// Response for cache invalidation.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    /// Cache that was touched
    pub resource: String,
    /// Entry that was targeted, if not the whole cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Number of entries dropped
    pub removed: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Per-cache statistics
    pub caches: Vec<CacheStats>,
}
