//! App state: provider caches, upstream sources, config.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use tally_cache::{BatchOutcome, CacheConfig, ProviderCache, Resolved};
use tally_core::constants::*;
use tally_core::error::{Result, TallyError};
use tally_core::keys::completion_key;
use tally_core::traits::{CompletionSource, HistorySource, QuoteSource};
use tally_core::types::{sort_daily_closes, Completion, CompletionRequest, DailyClose, Quote};
use tally_providers::{CompletionClient, LlmConfig, MarketConfig, MarketDataClient};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Market data upstream
    pub market: MarketConfig,
    /// LLM upstream
    pub llm: LlmConfig,
    /// Live quote cache
    pub quote_cache: CacheConfig,
    /// Daily history cache
    pub history_cache: CacheConfig,
    /// Completion cache
    pub llm_cache: CacheConfig,
    /// Most symbols accepted in one batch request
    pub max_batch_symbols: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            llm: LlmConfig::default(),
            quote_cache: CacheConfig::new(DEFAULT_QUOTE_TTL_MS, DEFAULT_QUOTE_MAX_ENTRIES),
            history_cache: CacheConfig::new(DEFAULT_HISTORY_TTL_MS, DEFAULT_HISTORY_MAX_ENTRIES),
            llm_cache: CacheConfig::new(DEFAULT_LLM_TTL_MS, DEFAULT_LLM_MAX_ENTRIES),
            max_batch_symbols: DEFAULT_MAX_BATCH_SYMBOLS,
        }
    }
}

impl ApiConfig {
    /// Loads `.env` (if present) and reads overrides from the environment.
    ///
    /// Unset variables keep their defaults; unparseable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let market = MarketConfig::new(env_string("MARKET_API_URL", DEFAULT_MARKET_API_URL))
            .with_timeout(env_parse("MARKET_TIMEOUT_SECS", DEFAULT_MARKET_TIMEOUT_SECS));

        let mut llm = LlmConfig::new(env_string("LLM_API_URL", DEFAULT_LLM_API_URL))
            .with_model(env_string("LLM_MODEL", DEFAULT_LLM_MODEL))
            .with_timeout(env_parse("LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS));
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            if !key.trim().is_empty() {
                llm = llm.with_api_key(key.trim());
            }
        }

        Self {
            market,
            llm,
            quote_cache: CacheConfig::new(
                env_parse("QUOTE_CACHE_TTL_MS", DEFAULT_QUOTE_TTL_MS),
                env_parse("QUOTE_CACHE_MAX_ENTRIES", DEFAULT_QUOTE_MAX_ENTRIES),
            ),
            history_cache: CacheConfig::new(
                env_parse("HISTORY_CACHE_TTL_MS", DEFAULT_HISTORY_TTL_MS),
                env_parse("HISTORY_CACHE_MAX_ENTRIES", DEFAULT_HISTORY_MAX_ENTRIES),
            ),
            llm_cache: CacheConfig::new(
                env_parse("LLM_CACHE_TTL_MS", DEFAULT_LLM_TTL_MS),
                env_parse("LLM_CACHE_MAX_ENTRIES", DEFAULT_LLM_MAX_ENTRIES),
            ),
            max_batch_symbols: env_parse("MAX_BATCH_SYMBOLS", DEFAULT_MAX_BATCH_SYMBOLS),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.into())
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, %default, "Ignoring invalid setting");
            default
        }
    }
}

/// Shared state handed to every handler.
///
/// One cache per upstream resource; the caches never share entries.
pub struct AppState {
    /// Configuration the state was built from
    pub config: ApiConfig,
    /// Live quotes by symbol
    pub quotes: ProviderCache<Quote>,
    /// Ascending daily closes by symbol
    pub history: ProviderCache<Vec<DailyClose>>,
    /// Completions by request hash
    pub completions: ProviderCache<Completion>,
    quote_source: Arc<dyn QuoteSource>,
    history_source: Arc<dyn HistorySource>,
    completion_source: Arc<dyn CompletionSource>,
}

impl AppState {
    /// Builds state backed by the HTTP providers.
    pub fn new(config: ApiConfig) -> Self {
        let market = Arc::new(MarketDataClient::with_config(config.market.clone()));
        let llm = Arc::new(CompletionClient::with_config(config.llm.clone()));
        Self::with_sources(config, market.clone(), market, llm)
    }

    /// Builds state around caller-supplied sources.
    pub fn with_sources(
        config: ApiConfig,
        quote_source: Arc<dyn QuoteSource>,
        history_source: Arc<dyn HistorySource>,
        completion_source: Arc<dyn CompletionSource>,
    ) -> Self {
        Self {
            quotes: ProviderCache::new("quotes", config.quote_cache),
            history: ProviderCache::new("history", config.history_cache),
            completions: ProviderCache::new("llm", config.llm_cache),
            config,
            quote_source,
            history_source,
            completion_source,
        }
    }

    /// Live quotes for already-normalized symbols, with stale fallback.
    pub async fn quote_batch(&self, symbols: Vec<String>) -> Result<BatchOutcome<Quote>> {
        self.quotes
            .resolve_many(
                symbols,
                |symbol| {
                    let source = self.quote_source.clone();
                    async move { source.quote(&symbol).await }
                },
                self.config.max_batch_symbols,
            )
            .await
    }

    /// Ascending daily closes for one normalized symbol, with stale fallback.
    pub async fn daily_history(&self, symbol: &str) -> Result<Resolved<Vec<DailyClose>>> {
        let mut outcome = self
            .history
            .resolve_many(
                [symbol],
                |symbol| {
                    let source = self.history_source.clone();
                    async move { source.daily_closes(&symbol).await.map(sort_daily_closes) }
                },
                1,
            )
            .await?;

        // A lone key either resolved (possibly stale) or already failed above.
        outcome
            .results
            .remove(symbol)
            .ok_or_else(|| TallyError::InternalError(format!("no history for {symbol}")))
    }

    /// Runs (or reuses) one completion. Returns the cache key alongside.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<(String, Resolved<Completion>)> {
        request.validate()?;
        let key = completion_key(&request);
        let source = self.completion_source.clone();
        let resolved = self
            .completions
            .resolve(&key, move || async move { source.complete(&request).await })
            .await?;
        Ok((key, resolved))
    }
}
