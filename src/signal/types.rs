use serde::{Deserialize, Serialize};

/// Default duration attached to a signal when the client omits one.
pub const DEFAULT_DURATION_SECONDS: u32 = 90;

// ═══════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════

/// Categorical trading direction returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Neutral => "NEUTRAL",
        }
    }

    /// Map an upper-cased, trimmed token to a signal.
    ///
    /// Accepts the canonical names plus the Portuguese and binary-options
    /// synonyms that upstream models answer with.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "BUY" | "COMPRA" | "CALL" => Some(Signal::Buy),
            "SELL" | "VENDA" | "PUT" => Some(Signal::Sell),
            "NEUTRAL" | "NEUTRO" | "HOLD" | "WAIT" => Some(Signal::Neutral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market class of the analysed chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Forex,
    Crypto,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Forex => "FOREX",
            AssetType::Crypto => "CRYPTO",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "FOREX" => Some(AssetType::Forex),
            "CRYPTO" => Some(AssetType::Crypto),
            _ => None,
        }
    }
}

/// Which signal values a deployment is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalVocabulary {
    /// BUY / SELL / NEUTRAL.
    #[default]
    Ternary,
    /// BUY / SELL only. NEUTRAL answers are substituted.
    Binary,
}

impl SignalVocabulary {
    pub fn allows(&self, signal: Signal) -> bool {
        match self {
            SignalVocabulary::Ternary => true,
            SignalVocabulary::Binary => signal != Signal::Neutral,
        }
    }

    /// Deterministic answer when the upstream gave no usable direction.
    pub fn fallback(&self) -> Signal {
        match self {
            SignalVocabulary::Ternary => Signal::Neutral,
            SignalVocabulary::Binary => Signal::Buy,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ternary" | "three" | "3" => Some(SignalVocabulary::Ternary),
            "binary" | "two" | "2" => Some(SignalVocabulary::Binary),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request / result entities
// ═══════════════════════════════════════════════════════════

/// One inbound analysis call. Lives only for the duration of the request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub asset: Option<String>,
    pub duration_seconds: u32,
}

/// Validated, client-safe signal. Serialized flat into the success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSignal {
    pub signal: Signal,
    pub confidence: u8,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    pub duration_seconds: u32,
}

/// Policy knobs the normalizer needs. Built from `ServiceConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePolicy {
    pub vocabulary: SignalVocabulary,
    pub require_asset_type: bool,
    pub duration_seconds: u32,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            vocabulary: SignalVocabulary::Ternary,
            require_asset_type: false,
            duration_seconds: DEFAULT_DURATION_SECONDS,
        }
    }
}

impl NormalizePolicy {
    pub fn with_duration(self, duration_seconds: u32) -> Self {
        Self {
            duration_seconds,
            ..self
        }
    }
}
