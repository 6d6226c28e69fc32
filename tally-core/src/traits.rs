//! Provider traits for Tally.
//!
//! These are the upstream seams: the HTTP clients in `tally-providers`
//! implement them, and tests substitute in-memory fakes. A provider owns its
//! own deadline and maps transport failures into [`TallyError`](crate::TallyError);
//! the cache never retries or classifies what a provider returns.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Completion, CompletionRequest, DailyClose, Quote};

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Live quote lookups.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetches the live quote for an already-normalized symbol.
    ///
    /// Fails with `RateLimited` when the upstream quota is exhausted.
    async fn quote(&self, symbol: &str) -> Result<Quote>;
}

/// Historical daily closes.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetches the daily closing series for an already-normalized symbol.
    ///
    /// Points may come back in any order; consumers sort them.
    async fn daily_closes(&self, symbol: &str) -> Result<Vec<DailyClose>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LLM
// ═══════════════════════════════════════════════════════════════════════════════

/// LLM completions.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Runs one completion. With a schema the answer is parsed JSON.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
