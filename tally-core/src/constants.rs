//! Defaults shared by the cache, the providers, and the API.
//!
//! Every value here can be overridden through configuration; these are only
//! what a fresh deployment starts with.

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Live quotes go stale quickly; one minute keeps the dashboard responsive
/// without burning the market API quota.
pub const DEFAULT_QUOTE_TTL_MS: i64 = 60_000;

/// Maximum number of live quotes kept in memory.
pub const DEFAULT_QUOTE_MAX_ENTRIES: i64 = 500;

/// Daily closes only change once per trading day.
pub const DEFAULT_HISTORY_TTL_MS: i64 = 6 * 60 * 60 * 1000;

/// Maximum number of historical series kept in memory.
pub const DEFAULT_HISTORY_MAX_ENTRIES: i64 = 200;

/// LLM completions are expensive; identical prompts reuse answers for ten minutes.
pub const DEFAULT_LLM_TTL_MS: i64 = 10 * 60 * 1000;

/// Maximum number of LLM completions kept in memory.
pub const DEFAULT_LLM_MAX_ENTRIES: i64 = 200;

/// Maximum number of distinct symbols accepted by one batch quote request.
pub const DEFAULT_MAX_BATCH_SYMBOLS: usize = 25;

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDER DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Base URL of the chart-style market data API.
pub const DEFAULT_MARKET_API_URL: &str = "https://query1.finance.yahoo.com";

/// Base URL of the LLM completion API.
pub const DEFAULT_LLM_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Default completion model.
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";

/// Deadline for a single market data request.
pub const DEFAULT_MARKET_TIMEOUT_SECS: u64 = 10;

/// Deadline for a single completion request.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Range requested when fetching daily history.
pub const DEFAULT_HISTORY_RANGE: &str = "1y";

// ═══════════════════════════════════════════════════════════════════════════════
// KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Longest ticker symbol accepted (covers suffixed listings like `BRK-B.TO`).
pub const MAX_SYMBOL_LEN: usize = 20;

/// Domain separator mixed into completion cache keys.
pub const DOMAIN_COMPLETION_KEY: &[u8] = b"TALLY_COMPLETION_KEY_V1";

/// Prefix of every completion cache key.
pub const COMPLETION_KEY_PREFIX: &str = "llm:";
