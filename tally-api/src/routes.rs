//! API route configuration.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Market data
        .route("/api/v1/quotes", get(handlers::batch_quotes))
        .route("/api/v1/quotes/:symbol", get(handlers::quote_detail))

        // LLM
        .route("/api/v1/llm/complete", post(handlers::complete))

        // Cache administration
        .route("/api/v1/cache/:resource", delete(handlers::clear_cache))
        .route("/api/v1/cache/:resource/:key", delete(handlers::invalidate_entry))

        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, NaiveDate};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use tally_core::error::{Result, TallyError};
    use tally_core::traits::{CompletionSource, HistorySource, QuoteSource};
    use tally_core::types::{Completion, CompletionRequest, DailyClose, Quote};

    use tally_cache::CacheConfig;

    use crate::state::ApiConfig;

    /// In-memory market: `FAIL` is rate limited, `GONE` does not exist.
    /// Once `outage` is set every symbol is rate limited.
    #[derive(Default)]
    struct FakeMarket {
        calls: AtomicUsize,
        outage: AtomicBool,
    }

    impl FakeMarket {
        fn check(&self, symbol: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.outage.load(Ordering::SeqCst) {
                return Err(TallyError::rate_limited("market"));
            }
            match symbol {
                "FAIL" => Err(TallyError::RateLimited {
                    provider: "market".into(),
                    retry_after_secs: Some(5),
                }),
                "GONE" => Err(TallyError::SymbolNotFound(symbol.into())),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for FakeMarket {
        async fn quote(&self, symbol: &str) -> Result<Quote> {
            self.check(symbol)?;
            Ok(Quote {
                symbol: symbol.into(),
                price: 110.0,
                previous_close: 100.0,
                currency: "USD".into(),
                exchange: "NasdaqGS".into(),
                timestamp: DateTime::from_timestamp(1_710_532_800, 0).unwrap(),
            })
        }
    }

    #[async_trait]
    impl HistorySource for FakeMarket {
        async fn daily_closes(&self, symbol: &str) -> Result<Vec<DailyClose>> {
            self.check(symbol)?;
            let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
            Ok(vec![
                DailyClose { date: day(15), close: 3.0 },
                DailyClose { date: day(13), close: 1.0 },
                DailyClose { date: day(14), close: 2.0 },
            ])
        }
    }

    #[derive(Default)]
    struct FakeLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionSource for FakeLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let raw = match request.schema {
                Some(_) => r#"{"ok": true}"#.to_string(),
                None => format!("echo: {}", request.prompt),
            };
            Completion::from_raw(request, raw)
        }
    }

    struct TestApp {
        router: Router,
        market: Arc<FakeMarket>,
        llm: Arc<FakeLlm>,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_config(ApiConfig {
                max_batch_symbols: 3,
                ..ApiConfig::default()
            })
        }

        /// Quote and history entries expire almost immediately.
        fn short_lived() -> Self {
            Self::with_config(ApiConfig {
                max_batch_symbols: 3,
                quote_cache: CacheConfig::new(1, 100),
                history_cache: CacheConfig::new(1, 100),
                ..ApiConfig::default()
            })
        }

        fn with_config(config: ApiConfig) -> Self {
            let market = Arc::new(FakeMarket::default());
            let llm = Arc::new(FakeLlm::default());
            let state = AppState::with_sources(config, market.clone(), market.clone(), llm.clone());
            Self {
                router: create_router(Arc::new(state)),
                market,
                llm,
            }
        }

        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send("GET", uri, None).await
        }

        fn market_calls(&self) -> usize {
            self.market.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new();
        let (status, body) = app.get("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["caches"].as_array().unwrap().len(), 3);
        assert_eq!(body["caches"][0]["name"], "quotes");
    }

    #[tokio::test]
    async fn test_batch_quotes_partial_failure_and_hits() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/v1/quotes?symbols=aapl,FAIL,msft").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quotes"]["AAPL"]["price"], 110.0);
        assert_eq!(body["quotes"]["AAPL"]["previousClose"], 100.0);
        assert_eq!(body["quotes"]["AAPL"]["stale"], false);
        assert!(body["quotes"].get("FAIL").is_none());
        assert_eq!(body["partialFailures"][0]["symbol"], "FAIL");
        assert_eq!(body["cacheHits"], json!([]));
        assert_eq!(app.market_calls(), 3);

        let (status, body) = app.get("/api/v1/quotes?symbols=AAPL,MSFT,FAIL").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cacheHits"], json!(["AAPL", "MSFT"]));
        assert_eq!(body["quotes"]["MSFT"]["cached"], true);
        assert_eq!(app.market_calls(), 4);
    }

    #[tokio::test]
    async fn test_batch_quotes_serve_stale_during_outage() {
        let app = TestApp::short_lived();
        let (_, body) = app.get("/api/v1/quotes?symbols=AAPL,MSFT").await;
        assert_eq!(body["quotes"]["AAPL"]["stale"], false);

        tokio::time::sleep(Duration::from_millis(20)).await;
        app.market.outage.store(true, Ordering::SeqCst);

        let (status, body) = app.get("/api/v1/quotes?symbols=AAPL,MSFT").await;
        assert_eq!(status, StatusCode::OK);
        for symbol in ["AAPL", "MSFT"] {
            let quote = &body["quotes"][symbol];
            assert_eq!(quote["stale"], true);
            assert_eq!(quote["cached"], false);
            assert_eq!(quote["price"], 110.0);
            assert!(quote["ageMs"].as_u64().unwrap() >= 20);
        }
        let failed: Vec<&str> = body["partialFailures"]
            .as_array()
            .unwrap()
            .iter()
            .map(|failure| failure["symbol"].as_str().unwrap())
            .collect();
        assert_eq!(failed, vec!["AAPL", "MSFT"]);
        assert_eq!(body["cacheHits"], json!([]));
        assert_eq!(app.market_calls(), 4);
    }

    #[tokio::test]
    async fn test_quote_detail_serves_stale_during_outage() {
        let app = TestApp::short_lived();
        let (status, _) = app.get("/api/v1/quotes/AAPL").await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(20)).await;
        app.market.outage.store(true, Ordering::SeqCst);

        let (status, body) = app.get("/api/v1/quotes/AAPL").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quote"]["stale"], true);
        assert_eq!(body["quote"]["cached"], false);
        assert!(body["quote"]["ageMs"].as_u64().unwrap() >= 20);
        assert_eq!(body["history"]["stale"], true);
        assert_eq!(body["history"]["cached"], false);
        assert!(body["history"]["ageMs"].as_u64().unwrap() >= 20);
        assert_eq!(body["history"]["points"].as_array().unwrap().len(), 3);
        assert_eq!(app.market_calls(), 4);
    }

    #[tokio::test]
    async fn test_batch_quotes_total_failure() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/v1/quotes?symbols=FAIL").await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_batch_quotes_rejects_bad_input() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/v1/quotes?symbols=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "EMPTY_BATCH");

        let (status, body) = app.get("/api/v1/quotes?symbols=A,B,C,D").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BATCH_TOO_LARGE");

        let (status, body) = app.get("/api/v1/quotes?symbols=AAPL,BAD$").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SYMBOL");

        assert_eq!(app.market_calls(), 0);
    }

    #[tokio::test]
    async fn test_quote_detail_and_refresh() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/v1/quotes/aapl").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["quote"]["change"], 10.0);
        let dates: Vec<&str> = body["history"]["points"]
            .as_array()
            .unwrap()
            .iter()
            .map(|point| point["date"].as_str().unwrap())
            .collect();
        assert_eq!(dates, vec!["2024-03-13", "2024-03-14", "2024-03-15"]);
        assert_eq!(app.market_calls(), 2);

        let (_, body) = app.get("/api/v1/quotes/AAPL").await;
        assert_eq!(body["quote"]["cached"], true);
        assert_eq!(body["history"]["cached"], true);
        assert_eq!(app.market_calls(), 2);

        let (_, body) = app.get("/api/v1/quotes/AAPL?refresh=true").await;
        assert_eq!(body["quote"]["cached"], false);
        assert_eq!(app.market_calls(), 4);
    }

    #[tokio::test]
    async fn test_quote_detail_unknown_symbol() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/v1/quotes/GONE").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_llm_complete_is_cached() {
        let app = TestApp::new();
        let request = json!({ "prompt": "hi", "systemInstruction": "be brief" });

        let (status, first) = app.send("POST", "/api/v1/llm/complete", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["result"], "echo: hi");
        assert_eq!(first["cached"], false);

        let (_, second) = app.send("POST", "/api/v1/llm/complete", Some(request)).await;
        assert_eq!(second["cached"], true);
        assert_eq!(second["cacheKey"], first["cacheKey"]);
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 1);

        let structured = json!({ "prompt": "hi", "schema": { "type": "object" } });
        let (_, body) = app.send("POST", "/api/v1/llm/complete", Some(structured)).await;
        assert_eq!(body["result"], json!({ "ok": true }));
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_llm_complete_rejects_empty_prompt() {
        let app = TestApp::new();
        let (status, body) = app
            .send("POST", "/api/v1/llm/complete", Some(json!({ "prompt": " " })))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_invalidation() {
        let app = TestApp::new();
        app.get("/api/v1/quotes?symbols=AAPL,MSFT").await;
        assert_eq!(app.market_calls(), 2);

        let (status, body) = app.send("DELETE", "/api/v1/cache/quotes/aapl", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"], "AAPL");
        assert_eq!(body["removed"], 1);

        let (_, body) = app.get("/api/v1/quotes?symbols=AAPL,MSFT").await;
        assert_eq!(body["cacheHits"], json!(["MSFT"]));
        assert_eq!(app.market_calls(), 3);

        let (_, body) = app.send("DELETE", "/api/v1/cache/quotes", None).await;
        assert_eq!(body["removed"], 2);

        let (status, _) = app.send("DELETE", "/api/v1/cache/nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
