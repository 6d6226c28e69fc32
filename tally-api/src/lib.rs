//! # Tally API Server
//!
//! REST API for the personal-finance dashboard. Every upstream call goes
//! through a request-coalescing cache, so a burst of dashboard refreshes costs
//! one market or LLM request per key.
//!
//! ## Endpoints
//!
//! - `GET /health` - Status, uptime, cache statistics
//! - `GET /api/v1/quotes?symbols=AAPL,MSFT` - Batch live quotes (partial failures tolerated)
//! - `GET /api/v1/quotes/:symbol` - Quote plus daily history (`?refresh=true` bypasses the cache)
//! - `POST /api/v1/llm/complete` - Cached LLM completion
//! - `DELETE /api/v1/cache/:resource[/:key]` - Invalidate `quotes`, `history` or `llm`
//!
//! ## Example
//!
//! ```rust,ignore
//! use tally_api::{ApiConfig, ApiServer};
//!
//! let server = ApiServer::new(ApiConfig::from_env());
//! server.run(([0, 0, 0, 0], 3001)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod dto;
mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{ApiConfig, AppState};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server for Tally.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server backed by the HTTP providers.
    pub fn new(config: ApiConfig) -> Self {
        Self::with_state(AppState::new(config))
    }

    /// Creates a server around prepared state.
    pub fn with_state(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Creates the router with all routes configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address.
    pub async fn run(self, addr: impl Into<SocketAddr>) -> std::io::Result<()> {
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        handlers::mark_started();
        info!(
            quote_ttl_ms = self.state.config.quote_cache.ttl_ms,
            llm_ttl_ms = self.state.config.llm_cache.ttl_ms,
            "Tally API server listening on {}",
            addr
        );

        axum::serve(listener, self.router()).await
    }
}

/// Starts the API server with configuration from the environment.
pub async fn start_server(port: u16) -> std::io::Result<()> {
    let config = ApiConfig::from_env();
    let server = ApiServer::new(config);
    server.run(([0, 0, 0, 0], port)).await
}
