//! Upstream HTTP clients for Tally.
//!
//! - [`MarketDataClient`]: live quotes and daily closes from a chart-style
//!   market data API
//! - [`CompletionClient`]: LLM completions from a `generateContent`-style API
//!
//! Both implement the provider traits from `tally-core`, enforce their own
//! request deadline, and map HTTP failures into `TallyError`. Neither caches;
//! wrap them in a `tally_cache::ProviderCache`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod http;
mod llm;
mod market;

pub use llm::{CompletionClient, LlmConfig};
pub use market::{MarketConfig, MarketDataClient};
