//! Upstream invokers: the one outbound call made per analysis request.
//!
//! Two implementations sit behind `SignalUpstream`:
//! - `HostedModelClient` — vision model over the OpenAI Responses API
//! - `InferenceProxyClient` — multipart forward to a separate inference service
//!
//! Neither retries. Timeouts, quota signals and malformed bodies are
//! reported as distinct `UpstreamError` variants so the API layer can map
//! them to distinct statuses.

pub mod hosted;
pub mod proxy;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{ServiceConfig, UpstreamSettings};
use crate::signal::{truncate_chars, AnalysisRequest};

pub use hosted::HostedModelClient;
pub use proxy::InferenceProxyClient;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Upstream rejected the configured credential (status {0})")]
    Unauthorized(u16),

    #[error("Cannot reach upstream: {0}")]
    Connection(String),

    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream rate limit reached")]
    RateLimited { retry_after: Option<u64> },

    #[error("Upstream quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Upstream returned error (status {status})")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    MalformedEnvelope(String),

    #[error("Upstream declined the request")]
    Rejected { body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Raw text returned by an upstream, tagged with how strictly to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamReply {
    /// Free text from a model; degraded normalization is acceptable.
    ModelText(String),
    /// Body from the inference proxy; it must contain a JSON object.
    ProxyBody(String),
}

impl UpstreamReply {
    pub fn text(&self) -> &str {
        match self {
            UpstreamReply::ModelText(t) | UpstreamReply::ProxyBody(t) => t,
        }
    }
}

/// One outbound call per inbound analysis request.
#[async_trait]
pub trait SignalUpstream: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn analyze(&self, request: &AnalysisRequest) -> Result<UpstreamReply, UpstreamError>;
}

/// Build the upstream selected by configuration.
pub fn build_upstream(config: &ServiceConfig) -> Result<Arc<dyn SignalUpstream>, UpstreamError> {
    let client = http_client(config.upstream_timeout)?;
    let upstream: Arc<dyn SignalUpstream> = match &config.upstream {
        UpstreamSettings::HostedModel {
            api_key,
            model,
            base_url,
        } => Arc::new(HostedModelClient::new(
            client,
            base_url,
            api_key.clone(),
            model,
            config.vocabulary,
            config.upstream_timeout,
        )),
        UpstreamSettings::Proxy { base_url } => Arc::new(InferenceProxyClient::new(
            client,
            base_url,
            config.upstream_timeout,
        )),
    };
    Ok(upstream)
}

/// Shared reqwest client with the call timeout applied.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("chart-signal/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamError::HttpClient(e.to_string()))
}

/// Map a transport-level reqwest failure to the upstream taxonomy.
pub(crate) fn classify_send_error(err: reqwest::Error, base_url: &str, timeout: Duration) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(timeout)
    } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
        // Resets and bodies cut short count as the upstream being unavailable.
        UpstreamError::Connection(base_url.to_string())
    } else {
        UpstreamError::HttpClient(err.to_string())
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Chars of an error body kept in `UpstreamError` variants.
pub(crate) const ERROR_BODY_CHARS: usize = 500;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Map a non-success status to the upstream taxonomy.
pub(crate) fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> UpstreamError {
    let detail = serde_json::from_str::<ErrorEnvelope>(&body).ok().map(|e| e.error);
    let billing = detail.as_ref().is_some_and(|d| {
        [d.kind.as_deref(), d.code.as_deref()]
            .into_iter()
            .flatten()
            .any(|c| c == "insufficient_quota" || c.contains("billing"))
    });
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| truncate_chars(&body, ERROR_BODY_CHARS));

    match status {
        401 | 403 => UpstreamError::Unauthorized(status),
        402 => UpstreamError::QuotaExhausted(message),
        429 if billing => UpstreamError::QuotaExhausted(message),
        429 => UpstreamError::RateLimited { retry_after },
        _ => UpstreamError::HttpStatus {
            status,
            body: truncate_chars(&body, ERROR_BODY_CHARS),
        },
    }
}
