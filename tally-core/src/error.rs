//! Error types for Tally.
//!
//! One error hierarchy, built with `thiserror`, shared by the cache engine,
//! the providers, and the API. Every variant is `Clone`: a single provider
//! failure is handed to the leader of an in-flight resolution and to every
//! caller that joined it.

use thiserror::Error;

/// Result type alias using `TallyError`.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Main error type for all Tally operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TallyError {
    // ═══════════════════════════════════════════════════════════════════════════
    // PROVIDER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Upstream rejected the call because of a quota or rate limit.
    #[error("Rate limited by {provider}{}", retry_hint(.retry_after_secs))]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Upstream answered, but the body could not be understood.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream error (HTTP {status}): {message}")]
    UpstreamError { status: u16, message: String },

    /// Upstream has no data for the requested ticker.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Transport-level failure talking to the upstream.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Upstream did not answer before the provider's deadline.
    #[error("Provider timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// The resolution was dropped before it produced a result.
    #[error("Resolution cancelled: {0}")]
    Cancelled(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION / VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A batch was requested with no keys.
    #[error("Batch must contain at least one key")]
    EmptyBatch,

    /// A batch was requested with more keys than allowed.
    #[error("Batch too large: at most {max} keys allowed, got {actual}")]
    BatchTooLarge { max: usize, actual: usize },

    /// Ticker symbol is empty or contains unsupported characters.
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl TallyError {
    /// Creates a rate-limit error without a retry hint.
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        TallyError::RateLimited {
            provider: provider.into(),
            retry_after_secs: None,
        }
    }

    /// Returns true if this error came from (or on behalf of) an upstream call.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            TallyError::RateLimited { .. }
                | TallyError::MalformedResponse(_)
                | TallyError::UpstreamError { .. }
                | TallyError::SymbolNotFound(_)
                | TallyError::HttpError(_)
                | TallyError::Timeout { .. }
                | TallyError::Cancelled(_)
        )
    }

    /// Returns true if the upstream asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TallyError::RateLimited { .. })
    }

    /// Returns true if this is a caller-side input error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            TallyError::EmptyBatch
                | TallyError::BatchTooLarge { .. }
                | TallyError::InvalidSymbol(_)
                | TallyError::ValidationError(_)
        )
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::MalformedResponse(err.to_string())
    }
}
