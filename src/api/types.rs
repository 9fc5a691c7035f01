//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ServiceConfig;
use crate::signal::NormalizedSignal;
use crate::upstream::SignalUpstream;

// ═══════════════════════════════════════════════════════════
// API context — shared state for every route
// ═══════════════════════════════════════════════════════════

/// Read-only configuration plus the one upstream client, shared by
/// all handlers. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<ServiceConfig>,
    pub upstream: Arc<dyn SignalUpstream>,
}

impl ApiContext {
    pub fn new(config: Arc<ServiceConfig>, upstream: Arc<dyn SignalUpstream>) -> Self {
        Self { config, upstream }
    }
}

// ═══════════════════════════════════════════════════════════
// Response bodies
// ═══════════════════════════════════════════════════════════

/// Success body for `POST /api/analyze`. Signal fields sit at the top level.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub signal: NormalizedSignal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}
