//! Domain types for Tally.
//!
//! - [`Quote`]: live price snapshot for one ticker
//! - [`DailyClose`]: one point of a daily closing-price series
//! - [`CompletionRequest`] / [`Completion`]: LLM prompt and its answer

mod completion;
mod quote;

pub use completion::*;
pub use quote::*;
