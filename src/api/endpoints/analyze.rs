//! `/api/analyze` — chart upload in, normalized signal out.
//!
//! Flow: parse the multipart form, validate the image, make exactly one
//! upstream call under the configured deadline, then normalize whatever
//! text came back. No outbound call is attempted when validation fails.

use std::time::Instant;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AnalyzeResponse, ApiContext};
use crate::signal::image::resolve_image_mime;
use crate::signal::{normalize, AnalysisRequest, DEFAULT_DURATION_SECONDS};
use crate::upstream::UpstreamReply;

/// Longest accepted asset symbol, after trimming.
const MAX_ASSET_CHARS: usize = 32;
/// Longest accepted horizon (one day).
const MAX_DURATION_SECONDS: u32 = 86_400;
const DEFAULT_FILE_NAME: &str = "chart";

const IMAGE_FIELDS: &[&str] = &["image", "grafico", "file"];
const ASSET_FIELDS: &[&str] = &["asset", "ativo"];
const DURATION_FIELDS: &[&str] = &["durationSeconds", "duracao", "duration"];

/// Raw form values before validation.
#[derive(Debug, Default)]
struct UploadForm {
    image: Option<UploadedImage>,
    asset: Option<String>,
    duration: Option<String>,
}

#[derive(Debug)]
struct UploadedImage {
    bytes: Vec<u8>,
    content_type: Option<String>,
    file_name: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════

/// `GET /api/analyze` — usage hint.
pub async fn usage() -> ApiError {
    ApiError::UsePost
}

/// `POST /api/analyze`
pub async fn analyze(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analyze", %request_id, upstream = ctx.upstream.name());

    async move {
        let multipart = multipart.map_err(|e| {
            tracing::warn!(error = %e, "rejected non-multipart upload");
            ApiError::Validation("expected multipart/form-data with an image field".into())
        })?;
        let form = read_form(multipart, ctx.config.max_upload_bytes).await?;
        let request = validate(form, ctx.config.max_upload_bytes).map_err(|e| {
            tracing::warn!(error = %e, "upload validation failed");
            e
        })?;

        tracing::info!(
            bytes = request.image_bytes.len(),
            mime = %request.mime_type,
            asset = request.asset.as_deref().unwrap_or("-"),
            duration_seconds = request.duration_seconds,
            "analysis requested"
        );

        let started = Instant::now();
        let reply = tokio::time::timeout(ctx.config.upstream_timeout, ctx.upstream.analyze(&request))
            .await
            .map_err(|_| {
                tracing::warn!(elapsed_ms = started.elapsed().as_millis() as u64, "upstream deadline elapsed");
                ApiError::UpstreamTimeout
            })?
            .map_err(|e| {
                tracing::warn!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "upstream call failed");
                ApiError::from(e)
            })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let policy = ctx.config.normalize_policy(request.duration_seconds);
        let normalization = normalize(reply.text(), &policy);

        let reason = normalization.reason().map(|r| r.to_string()).unwrap_or_default();
        tracing::info!(
            elapsed_ms,
            signal = %normalization.signal().signal,
            confidence = normalization.signal().confidence,
            degraded = !normalization.is_confident(),
            reason = %reason,
            "upstream answered"
        );

        let (degraded, raw) = match &reply {
            UpstreamReply::ProxyBody(body) if !normalization.found_object() => {
                return Err(ApiError::bad_upstream(None, body));
            }
            UpstreamReply::ProxyBody(_) => (!normalization.is_confident(), None),
            UpstreamReply::ModelText(_) => {
                let degraded = !normalization.is_confident();
                let raw = degraded
                    .then(|| normalization.raw_excerpt().map(str::to_string))
                    .flatten();
                (degraded, raw)
            }
        };

        Ok::<_, ApiError>(Json(AnalyzeResponse {
            ok: true,
            signal: normalization.into_signal(),
            asset: request.asset,
            degraded,
            raw,
        }))
    }
    .instrument(span)
    .await
}

// ═══════════════════════════════════════════════════════════
// Form parsing and validation
// ═══════════════════════════════════════════════════════════

fn multipart_error(err: MultipartError, limit_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit_bytes }
    } else {
        ApiError::Validation(format!("invalid multipart body: {}", err.body_text()))
    }
}

async fn read_form(mut multipart: Multipart, limit_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if IMAGE_FIELDS.contains(&name.as_str()) {
            if form.image.is_some() {
                continue;
            }
            let content_type = field.content_type().map(str::to_string);
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, limit_bytes))?;
            form.image = Some(UploadedImage {
                bytes: bytes.to_vec(),
                content_type,
                file_name,
            });
        } else if ASSET_FIELDS.contains(&name.as_str()) {
            let text = field.text().await.map_err(|e| multipart_error(e, limit_bytes))?;
            form.asset.get_or_insert(text);
        } else if DURATION_FIELDS.contains(&name.as_str()) {
            let text = field.text().await.map_err(|e| multipart_error(e, limit_bytes))?;
            form.duration.get_or_insert(text);
        }
    }

    Ok(form)
}

fn validate(form: UploadForm, limit_bytes: usize) -> Result<AnalysisRequest, ApiError> {
    let image = form
        .image
        .ok_or_else(|| ApiError::Validation("missing file: send the chart in the 'image' field".into()))?;

    if image.bytes.is_empty() {
        return Err(ApiError::Validation("empty file".into()));
    }
    if image.bytes.len() > limit_bytes {
        return Err(ApiError::PayloadTooLarge { limit_bytes });
    }

    let mime_type = resolve_image_mime(
        image.content_type.as_deref(),
        image.file_name.as_deref(),
        &image.bytes,
    )
    .ok_or_else(|| ApiError::Validation("file is not a supported image (png, jpeg, webp, gif)".into()))?;

    Ok(AnalysisRequest {
        asset: parse_asset(form.asset.as_deref())?,
        duration_seconds: parse_duration(form.duration.as_deref())?,
        file_name: image
            .file_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
        mime_type,
        image_bytes: image.bytes,
    })
}

fn parse_asset(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let asset = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(a) => a.to_uppercase(),
    };
    if asset.chars().count() > MAX_ASSET_CHARS {
        return Err(ApiError::Validation(format!(
            "asset must be at most {MAX_ASSET_CHARS} characters"
        )));
    }
    Ok(Some(asset))
}

fn parse_duration(raw: Option<&str>) -> Result<u32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_DURATION_SECONDS),
        Some(r) => r,
    };
    match raw.parse::<u32>() {
        Ok(secs) if (1..=MAX_DURATION_SECONDS).contains(&secs) => Ok(secs),
        _ => Err(ApiError::Validation(format!(
            "durationSeconds must be an integer between 1 and {MAX_DURATION_SECONDS}"
        ))),
    }
}
