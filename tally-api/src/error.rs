//! API error handling.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tally_core::error::TallyError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            retry_after_secs: None,
        }
    }

    /// Bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    /// Internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }

    /// HTTP status this error responds with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        match &err {
            TallyError::EmptyBatch => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string(), "EMPTY_BATCH")
            }
            TallyError::BatchTooLarge { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string(), "BATCH_TOO_LARGE")
            }
            TallyError::InvalidSymbol(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_SYMBOL")
            }
            TallyError::ValidationError(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string(), "VALIDATION_ERROR")
            }
            TallyError::SymbolNotFound(_) => ApiError::not_found(err.to_string()),
            TallyError::RateLimited {
                retry_after_secs, ..
            } => {
                let mut api =
                    ApiError::new(StatusCode::TOO_MANY_REQUESTS, err.to_string(), "RATE_LIMITED");
                api.retry_after_secs = *retry_after_secs;
                api
            }
            TallyError::Timeout { .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string(), "UPSTREAM_TIMEOUT")
            }
            TallyError::MalformedResponse(_)
            | TallyError::UpstreamError { .. }
            | TallyError::HttpError(_)
            | TallyError::Cancelled(_) => {
                tracing::warn!(error = %err, "Upstream failure");
                ApiError::new(StatusCode::BAD_GATEWAY, err.to_string(), "UPSTREAM_ERROR")
            }
            TallyError::ConfigError(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "NOT_CONFIGURED",
            ),
            TallyError::InternalError(_) => {
                tracing::error!(error = %err, "Internal error");
                ApiError::internal("An internal error occurred")
            }
        }
    }
}
