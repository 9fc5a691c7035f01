//! API error types with structured JSON responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::signal::truncate_chars;
use crate::upstream::UpstreamError;

/// Chars of an upstream body echoed back to clients.
pub const EXCERPT_CHARS: usize = 300;

/// Error body shared by every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Request-boundary errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Image is larger than the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: usize },
    #[error("Service is not configured: {0}")]
    NotConfigured(String),
    #[error("Analysis service is unreachable")]
    UpstreamUnavailable,
    #[error("Analysis service did not answer in time")]
    UpstreamTimeout,
    #[error("Analysis service returned an unusable response")]
    BadUpstreamResponse { status: Option<u16>, excerpt: String },
    #[error("Too many requests, try again later")]
    RateLimited { retry_after: Option<u64> },
    #[error("Analysis quota exhausted")]
    QuotaExceeded,
    #[error("Use POST with multipart/form-data")]
    UsePost,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotConfigured(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamUnavailable | ApiError::BadUpstreamResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            ApiError::UsePost => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::NotConfigured(_) => "NOT_CONFIGURED",
            ApiError::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ApiError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ApiError::BadUpstreamResponse { .. } => "BAD_UPSTREAM_RESPONSE",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::QuotaExceeded => "QUOTA_EXCEEDED",
            ApiError::UsePost => "USE_POST",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// Build a `BadUpstreamResponse` from a raw body, keeping a short excerpt.
    pub fn bad_upstream(status: Option<u16>, body: &str) -> Self {
        ApiError::BadUpstreamResponse {
            status,
            excerpt: truncate_chars(body, EXCERPT_CHARS),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::PayloadTooLarge { limit_bytes } => Some(json!({ "limitBytes": limit_bytes })),
            ApiError::BadUpstreamResponse { status, excerpt } => {
                let mut details = json!({ "excerpt": excerpt });
                if let Some(status) = status {
                    details["upstreamStatus"] = json!(status);
                }
                Some(details)
            }
            ApiError::RateLimited {
                retry_after: Some(secs),
            } => Some(json!({ "retryAfterSeconds": secs })),
            ApiError::UsePost => Some(json!({
                "method": "POST",
                "contentType": "multipart/form-data",
                "fields": {
                    "image": "chart screenshot (required)",
                    "asset": "e.g. EURUSD (optional)",
                    "durationSeconds": "e.g. 90 (optional)"
                }
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
            ApiError::NotConfigured(detail) => {
                tracing::error!(detail, "Service is not configured");
                "Analysis service is not configured".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            ok: false,
            error: message,
            code: self.code(),
            details: self.details(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited {
            retry_after: Some(secs),
        } = &self
        {
            if let Ok(val) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotConfigured(what) => ApiError::NotConfigured(what.to_string()),
            UpstreamError::Unauthorized(status) => {
                ApiError::NotConfigured(format!("upstream rejected the credential (status {status})"))
            }
            UpstreamError::Connection(_) => ApiError::UpstreamUnavailable,
            UpstreamError::Timeout(_) => ApiError::UpstreamTimeout,
            UpstreamError::RateLimited { retry_after } => ApiError::RateLimited { retry_after },
            UpstreamError::QuotaExhausted(_) => ApiError::QuotaExceeded,
            UpstreamError::HttpStatus { status, body } => ApiError::bad_upstream(Some(status), &body),
            UpstreamError::MalformedEnvelope(body) | UpstreamError::Rejected { body } => {
                ApiError::bad_upstream(None, &body)
            }
            UpstreamError::HttpClient(detail) => ApiError::Internal(detail),
        }
    }
}
