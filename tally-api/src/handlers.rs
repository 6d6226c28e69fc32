//! API route handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{debug, info};

use tally_core::keys::{symbol_key, symbol_keys};
use tally_core::types::CompletionRequest;

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

/// GET /api/v1/quotes?symbols=AAPL,MSFT
pub async fn batch_quotes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuotesQuery>,
) -> Result<Json<QuotesResponse>> {
    let symbols = symbol_keys(&query.symbols)?;
    let outcome = state.quote_batch(symbols).await?;

    if outcome.is_partial() {
        info!(
            failed = outcome.failures.len(),
            stale = outcome.stale_keys().len(),
            "Serving partial quote batch"
        );
    }

    Ok(Json(QuotesResponse {
        cache_hits: outcome.hits.into_iter().collect(),
        quotes: outcome
            .results
            .into_iter()
            .map(|(symbol, resolved)| (symbol, QuoteDto::from(resolved)))
            .collect(),
        partial_failures: outcome.failures.into_iter().map(FailureDto::from).collect(),
    }))
}

/// GET /api/v1/quotes/:symbol
///
/// `?refresh=true` drops the cached quote and history first.
pub async fn quote_detail(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<QuoteDetailResponse>> {
    let symbol = symbol_key(&symbol)?;

    if query.refresh {
        state.quotes.invalidate(&symbol);
        state.history.invalidate(&symbol);
        debug!(symbol = %symbol, "Refresh requested");
    }

    let (quotes, history) = tokio::join!(
        state.quote_batch(vec![symbol.clone()]),
        state.daily_history(&symbol),
    );
    let mut quotes = quotes?;
    let history = history?;

    let quote = quotes
        .results
        .remove(&symbol)
        .ok_or_else(|| ApiError::internal(format!("no quote for {symbol}")))?;

    Ok(Json(QuoteDetailResponse {
        symbol,
        quote: QuoteDto::from(quote),
        history: HistoryDto::from(history),
    }))
}

/// POST /api/v1/llm/complete
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompletionRequest>,
) -> Result<Json<CompletionResponse>> {
    let (cache_key, resolved) = state.complete(request).await?;

    Ok(Json(CompletionResponse {
        result: resolved.value.to_value(),
        cached: resolved.cache_hit,
        age_ms: resolved.age_ms(),
        cache_key,
    }))
}

/// Caches that can be invalidated over the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheResource {
    Quotes,
    History,
    Llm,
}

impl CacheResource {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "quotes" => Ok(Self::Quotes),
            "history" => Ok(Self::History),
            "llm" => Ok(Self::Llm),
            other => Err(ApiError::bad_request(format!(
                "Unknown cache '{other}' (expected quotes, history or llm)"
            ))),
        }
    }

    fn len(self, state: &AppState) -> usize {
        match self {
            Self::Quotes => state.quotes.len(),
            Self::History => state.history.len(),
            Self::Llm => state.completions.len(),
        }
    }

    fn clear(self, state: &AppState) {
        match self {
            Self::Quotes => state.quotes.clear(),
            Self::History => state.history.clear(),
            Self::Llm => state.completions.clear(),
        }
    }

    /// Symbol caches are keyed by normalized symbol; LLM keys are opaque.
    fn invalidate(self, state: &AppState, key: &str) -> Result<(String, bool)> {
        Ok(match self {
            Self::Quotes => {
                let key = symbol_key(key)?;
                let removed = state.quotes.invalidate(&key);
                (key, removed)
            }
            Self::History => {
                let key = symbol_key(key)?;
                let removed = state.history.invalidate(&key);
                (key, removed)
            }
            Self::Llm => (key.to_string(), state.completions.invalidate(key)),
        })
    }
}

/// DELETE /api/v1/cache/:resource
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let cache = CacheResource::parse(&resource)?;
    let removed = cache.len(&state);
    cache.clear(&state);

    info!(resource = %resource, removed, "Cache cleared");
    Ok(Json(InvalidateResponse {
        resource,
        key: None,
        removed,
    }))
}

/// DELETE /api/v1/cache/:resource/:key
pub async fn invalidate_entry(
    State(state): State<Arc<AppState>>,
    Path((resource, key)): Path<(String, String)>,
) -> Result<Json<InvalidateResponse>> {
    let cache = CacheResource::parse(&resource)?;
    let (key, removed) = cache.invalidate(&state, &key)?;

    Ok(Json(InvalidateResponse {
        resource,
        key: Some(key),
        removed: usize::from(removed),
    }))
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Marks the server start for uptime reporting.
pub(crate) fn mark_started() {
    START_TIME.get_or_init(Instant::now);
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let start = START_TIME.get_or_init(Instant::now);
    let uptime = start.elapsed().as_secs();

    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: uptime,
        caches: vec![
            state.quotes.stats(),
            state.history.stats(),
            state.completions.stats(),
        ],
    })
}
