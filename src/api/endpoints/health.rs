//! Liveness endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct ServiceInfo {
    pub ok: bool,
    pub service: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub time: String,
}

/// `GET /` — service banner.
pub async fn root(State(ctx): State<ApiContext>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: ctx.config.service_name.clone(),
        version: crate::config::APP_VERSION,
    })
}

/// `GET /health` — liveness probe. Never calls the upstream.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: ctx.config.service_name.clone(),
        time: chrono::Utc::now().to_rfc3339(),
    })
}
