//! # Tally Core
//!
//! Core types, errors, and traits shared by every Tally crate.
//!
//! - **Types**: quotes, daily closes, and LLM completion requests
//! - **Errors**: a single cloneable error type for provider and configuration failures
//! - **Keys**: deterministic cache-key derivation for quotes and completions
//! - **Constants**: default TTLs, capacities, and batch limits
//! - **Traits**: the upstream provider interfaces
//!
//! ## Example
//!
//! ```rust
//! use tally_core::keys::symbol_key;
//!
//! assert_eq!(symbol_key(" aapl ").unwrap(), "AAPL");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod keys;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{Result, TallyError};
pub use traits::*;
pub use types::*;
