//! Shared HTTP plumbing: client construction and error mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::warn;

use tally_core::error::{Result, TallyError};

/// Longest upstream body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout_seconds: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .expect("Failed to create HTTP client")
}

/// Maps a transport failure (connect, send, or body read).
pub(crate) fn transport_error(err: reqwest::Error, timeout_seconds: u64) -> TallyError {
    if err.is_timeout() {
        TallyError::Timeout {
            seconds: timeout_seconds,
        }
    } else {
        TallyError::HttpError(err.to_string())
    }
}

/// Reads the whole body as text.
pub(crate) async fn read_body(response: Response, timeout_seconds: u64) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout_seconds))
}

/// Passes a successful response through; turns anything else into an error.
///
/// 429 becomes `RateLimited` (honouring a numeric `Retry-After`); every other
/// non-2xx status becomes `UpstreamError` carrying the upstream's message.
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
    timeout_seconds: u64,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = retry_after_secs(response.headers());
        warn!(provider, ?retry_after_secs, "Upstream rate limit hit");
        return Err(TallyError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        });
    }

    let body = read_body(response, timeout_seconds).await.unwrap_or_default();
    Err(TallyError::UpstreamError {
        status: status.as_u16(),
        message: upstream_message(&body).unwrap_or_else(|| status.to_string()),
    })
}

/// Seconds from a `Retry-After` header. HTTP-date values are ignored.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Best-effort human message from an upstream error body.
///
/// Understands `{"error": {"message": ..}}` and
/// `{"chart": {"error": {"description": ..}}}`; otherwise falls back to the
/// raw body, truncated.
pub(crate) fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.pointer("/chart/error/description"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return Some(message.to_string());
        }
    }

    Some(truncate(trimmed, MAX_ERROR_BODY))
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
