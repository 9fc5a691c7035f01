use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{
    classify_send_error, classify_status, retry_after_secs, SignalUpstream, UpstreamError,
    UpstreamReply, ERROR_BODY_CHARS,
};
use crate::signal::{truncate_chars, AnalysisRequest};

/// Forwards the chart to a separate inference service as multipart.
///
/// Field names follow the service's contract: `grafico` (image),
/// `ativo` (asset, omitted when unknown) and `duracao` (seconds).
pub struct InferenceProxyClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl InferenceProxyClient {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn form(request: &AnalysisRequest) -> Result<Form, UpstreamError> {
        let image = Part::bytes(request.image_bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(&request.mime_type)
            .map_err(|e| UpstreamError::HttpClient(e.to_string()))?;

        let mut form = Form::new().part("grafico", image);
        if let Some(asset) = &request.asset {
            form = form.text("ativo", asset.clone());
        }
        Ok(form.text("duracao", request.duration_seconds.to_string()))
    }
}

/// True when the service answered with an explicit `{"ok": false, ...}`.
fn is_declined(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("ok").and_then(|ok| ok.as_bool()))
        == Some(false)
}

#[async_trait]
impl SignalUpstream for InferenceProxyClient {
    fn name(&self) -> &'static str {
        "inference-proxy"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<UpstreamReply, UpstreamError> {
        let url = format!("{}/predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(Self::form(request)?)
            .send()
            .await
            .map_err(|e| classify_send_error(e, &self.base_url, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "inference proxy returned error status");
            return Err(classify_status(status.as_u16(), retry_after, body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_send_error(e, &self.base_url, self.timeout))?;

        if is_declined(&body) {
            tracing::warn!("inference proxy declined the request");
            return Err(UpstreamError::Rejected {
                body: truncate_chars(&body, ERROR_BODY_CHARS),
            });
        }

        Ok(UpstreamReply::ProxyBody(body))
    }
}
