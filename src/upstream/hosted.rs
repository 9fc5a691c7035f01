use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    classify_send_error, classify_status, retry_after_secs, SignalUpstream, UpstreamError,
    UpstreamReply, ERROR_BODY_CHARS,
};
use crate::signal::image::to_data_uri;
use crate::signal::prompt::{system_prompt, user_prompt};
use crate::signal::{truncate_chars, AnalysisRequest, SignalVocabulary};

/// Sampling temperature for chart reading; low for repeatable answers.
const TEMPERATURE: f32 = 0.2;

/// Vision-model client for the OpenAI Responses API.
pub struct HostedModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    vocabulary: SignalVocabulary,
    timeout: Duration,
}

impl HostedModelClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        vocabulary: SignalVocabulary,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            vocabulary,
            timeout,
        }
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentInput>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentInput {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Deserialize)]
struct ResponsesEnvelope {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesEnvelope {
    /// Model text: the convenience field when present, else every
    /// `output_text` part joined.
    fn into_text(self) -> String {
        if let Some(text) = self.output_text.filter(|t| !t.trim().is_empty()) {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SignalUpstream for HostedModelClient {
    fn name(&self) -> &'static str {
        "hosted-model"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<UpstreamReply, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("OPENAI_API_KEY is missing"))?;

        let user = user_prompt(request);
        let body = ResponsesRequest {
            model: &self.model,
            input: vec![
                InputMessage {
                    role: "system",
                    content: MessageContent::Text(system_prompt(self.vocabulary)),
                },
                InputMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentInput::InputText { text: user },
                        ContentInput::InputImage {
                            image_url: to_data_uri(&request.mime_type, &request.image_bytes),
                        },
                    ]),
                },
            ],
            temperature: TEMPERATURE,
        };

        let url = format!("{}/responses", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(e, &self.base_url, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), model = %self.model, "hosted model returned error status");
            return Err(classify_status(status.as_u16(), retry_after, body));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| classify_send_error(e, &self.base_url, self.timeout))?;
        let envelope: ResponsesEnvelope = serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!(error = %e, "hosted model envelope is not valid JSON");
            UpstreamError::MalformedEnvelope(truncate_chars(&raw, ERROR_BODY_CHARS))
        })?;

        Ok(UpstreamReply::ModelText(envelope.into_text()))
    }
}
