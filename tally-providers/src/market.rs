//! Market data client.
//!
//! Talks to a chart-style endpoint (`/v8/finance/chart/{symbol}`) that returns
//! the live quote in `meta` and the daily series as parallel `timestamp` and
//! `close` arrays.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use tally_core::constants::{
    DEFAULT_HISTORY_RANGE, DEFAULT_MARKET_API_URL, DEFAULT_MARKET_TIMEOUT_SECS,
};
use tally_core::error::{Result, TallyError};
use tally_core::traits::{HistorySource, QuoteSource};
use tally_core::types::{DailyClose, Quote};

use crate::http::{build_client, check_status, read_body, transport_error};

const PROVIDER: &str = "market";

/// Market data client configuration.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MarketConfig {
    /// API base URL (scheme and host, no trailing path)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Range requested for daily history (e.g. "1y", "6mo")
    pub history_range: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MARKET_API_URL.to_string(),
            timeout_seconds: DEFAULT_MARKET_TIMEOUT_SECS,
            history_range: DEFAULT_HISTORY_RANGE.to_string(),
        }
    }
}

impl MarketConfig {
    /// Creates config for the given base URL with default timeout and range.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the history range.
    pub fn with_history_range(mut self, range: impl Into<String>) -> Self {
        self.history_range = range.into();
        self
    }
}

/// Client for live quotes and daily closing prices.
pub struct MarketDataClient {
    config: MarketConfig,
    http_client: reqwest::Client,
}

impl MarketDataClient {
    /// Creates a new client with the given config.
    pub fn with_config(config: MarketConfig) -> Self {
        let http_client = build_client(config.timeout_seconds);
        Self {
            config,
            http_client,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Fetches the chart payload for `symbol` over `range`.
    async fn fetch_chart(&self, symbol: &str, range: &str) -> Result<ChartResult> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.config.base_url.trim_end_matches('/'),
            symbol
        );
        let timeout = self.config.timeout_seconds;

        let response = self
            .http_client
            .get(&url)
            .query(&[("interval", "1d"), ("range", range)])
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TallyError::SymbolNotFound(symbol.to_string()));
        }
        let response = check_status(PROVIDER, response, timeout).await?;
        let body = read_body(response, timeout).await?;
        let payload: ChartResponse = serde_json::from_str(&body)?;

        if let Some(error) = payload.chart.error {
            return Err(chart_error(symbol, error));
        }
        payload
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| TallyError::SymbolNotFound(symbol.to_string()))
    }
}

#[async_trait]
impl QuoteSource for MarketDataClient {
    #[instrument(skip(self))]
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        info!("Fetching live quote");
        let chart = self.fetch_chart(symbol, "1d").await?;
        let quote = chart.meta.into_quote(symbol)?;
        debug!(price = quote.price, currency = %quote.currency, "Quote received");
        Ok(quote)
    }
}

#[async_trait]
impl HistorySource for MarketDataClient {
    #[instrument(skip(self))]
    async fn daily_closes(&self, symbol: &str) -> Result<Vec<DailyClose>> {
        info!(range = %self.config.history_range, "Fetching daily closes");
        let chart = self.fetch_chart(symbol, &self.config.history_range).await?;
        let series = chart.daily_closes()?;
        debug!(points = series.len(), "History received");
        Ok(series)
    }
}

fn chart_error(symbol: &str, error: ChartError) -> TallyError {
    if error.code.eq_ignore_ascii_case("Not Found") {
        TallyError::SymbolNotFound(symbol.to_string())
    } else {
        TallyError::UpstreamError {
            status: 200,
            message: format!("{}: {}", error.code, error.description),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    full_exchange_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
}

#[derive(Debug, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartMeta {
    fn into_quote(self, symbol: &str) -> Result<Quote> {
        let price = self.regular_market_price.ok_or_else(|| {
            TallyError::MalformedResponse(format!("no regularMarketPrice for {symbol}"))
        })?;
        let timestamp = self
            .regular_market_time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            previous_close: self
                .chart_previous_close
                .or(self.previous_close)
                .unwrap_or(price),
            currency: self.currency.unwrap_or_else(|| "USD".into()),
            exchange: self
                .full_exchange_name
                .or(self.exchange_name)
                .unwrap_or_default(),
            timestamp,
        })
    }
}

impl ChartResult {
    fn daily_closes(self) -> Result<Vec<DailyClose>> {
        let closes = self
            .indicators
            .and_then(|indicators| indicators.quote.into_iter().next())
            .map(|quote| quote.close)
            .unwrap_or_default();

        if closes.len() != self.timestamp.len() {
            return Err(TallyError::MalformedResponse(format!(
                "{} timestamps but {} closes",
                self.timestamp.len(),
                closes.len()
            )));
        }

        let offset = self.meta.gmtoffset.unwrap_or(0);
        let series = self
            .timestamp
            .into_iter()
            .zip(closes)
            .filter_map(|(secs, close)| {
                let close = close.filter(|c| c.is_finite())?;
                let local = secs.checked_add(offset)?;
                let date = DateTime::<Utc>::from_timestamp(local, 0)?.date_naive();
                Some(DailyClose { date, close })
            })
            .collect();
        Ok(series)
    }
}
