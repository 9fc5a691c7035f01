//! Response normalizer: untrusted upstream text in, `NormalizedSignal` out.
//!
//! This is the only invariant-preserving boundary between whatever a
//! third-party model produced and the contract callers rely on:
//! `signal` is always an enum member, `confidence` is clamped to 0..=100
//! and `summary` is length-capped. The function is pure and total; every
//! failure degrades to a deterministic low-confidence answer.

use serde_json::{Map, Value};

use super::parser::extract_json_object;
use super::types::{AssetType, NormalizePolicy, NormalizedSignal, Signal, SignalVocabulary};

/// Confidence used when the object carries no usable number.
pub const DEFAULT_CONFIDENCE: u8 = 30;
/// Confidence attached to heuristic (no-JSON) answers.
pub const DEGRADED_CONFIDENCE: u8 = 30;
/// Maximum summary length, in chars.
pub const MAX_SUMMARY_CHARS: usize = 220;
/// Maximum raw excerpt kept for diagnostics, in chars.
pub const MAX_RAW_EXCERPT_CHARS: usize = 600;

const SIGNAL_KEYS: &[&str] = &["signal", "sinal", "direction", "action"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "confianca", "confiança"];
const SUMMARY_KEYS: &[&str] = &["summary", "reason", "resumo", "motivo", "analysis"];
const ASSET_TYPE_KEYS: &[&str] = &["assetType", "asset_type"];

const BUY_WORDS: &[&str] = &["buy", "compra", "comprar", "call", "bullish", "alta"];
const SELL_WORDS: &[&str] = &["sell", "venda", "vender", "put", "bearish", "baixa"];

const NO_JSON_SUMMARY: &str = "Could not extract a structured answer from the analysis.";
const EMPTY_SUMMARY: &str = "The upstream returned no analysis.";

// ═══════════════════════════════════════════════════════════
// Result type
// ═══════════════════════════════════════════════════════════

/// Why a normalization could not be taken at face value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// Input was empty or whitespace.
    EmptyInput,
    /// No JSON object anywhere in the text; keyword heuristic used.
    NoJsonObject,
    /// Object found without a signal field.
    MissingSignal,
    /// Signal field held a value outside the vocabulary (capped copy kept).
    UnrecognizedSignal(String),
    /// Valid signal the configured vocabulary does not allow.
    SignalNotAllowed(Signal),
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::EmptyInput => f.write_str("empty upstream output"),
            DegradeReason::NoJsonObject => f.write_str("no JSON object in upstream output"),
            DegradeReason::MissingSignal => f.write_str("signal field missing"),
            DegradeReason::UnrecognizedSignal(raw) => write!(f, "unrecognized signal {raw:?}"),
            DegradeReason::SignalNotAllowed(s) => write!(f, "signal {s} not allowed by vocabulary"),
        }
    }
}

/// Outcome of normalizing one upstream text.
///
/// Every variant carries a well-formed `NormalizedSignal`, so callers can
/// always answer; the variant tells them how much to trust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    /// Object found and its signal recognized.
    Confident(NormalizedSignal),
    /// Something was substituted.
    Degraded {
        signal: NormalizedSignal,
        reason: DegradeReason,
        raw_excerpt: String,
    },
    /// Nothing to normalize.
    Failed {
        signal: NormalizedSignal,
        reason: DegradeReason,
    },
}

impl Normalization {
    pub fn signal(&self) -> &NormalizedSignal {
        match self {
            Normalization::Confident(s) => s,
            Normalization::Degraded { signal, .. } | Normalization::Failed { signal, .. } => signal,
        }
    }

    pub fn into_signal(self) -> NormalizedSignal {
        match self {
            Normalization::Confident(s) => s,
            Normalization::Degraded { signal, .. } | Normalization::Failed { signal, .. } => signal,
        }
    }

    pub fn is_confident(&self) -> bool {
        matches!(self, Normalization::Confident(_))
    }

    /// True when a JSON object was located in the input.
    pub fn found_object(&self) -> bool {
        match self {
            Normalization::Confident(_) => true,
            Normalization::Degraded { reason, .. } => *reason != DegradeReason::NoJsonObject,
            Normalization::Failed { .. } => false,
        }
    }

    pub fn reason(&self) -> Option<&DegradeReason> {
        match self {
            Normalization::Confident(_) => None,
            Normalization::Degraded { reason, .. } | Normalization::Failed { reason, .. } => {
                Some(reason)
            }
        }
    }

    pub fn raw_excerpt(&self) -> Option<&str> {
        match self {
            Normalization::Degraded { raw_excerpt, .. } => Some(raw_excerpt),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════

/// Normalize raw upstream text under `policy`. Never panics.
pub fn normalize(raw: &str, policy: &NormalizePolicy) -> Normalization {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Normalization::Failed {
            signal: fallback_signal(policy, None, EMPTY_SUMMARY),
            reason: DegradeReason::EmptyInput,
        };
    }

    match extract_json_object(trimmed) {
        Some((obj, path)) => {
            tracing::trace!(?path, "upstream JSON object located");
            from_object(&obj, trimmed, policy)
        }
        None => Normalization::Degraded {
            signal: fallback_signal(policy, keyword_lean(trimmed), NO_JSON_SUMMARY),
            reason: DegradeReason::NoJsonObject,
            raw_excerpt: truncate_chars(trimmed, MAX_RAW_EXCERPT_CHARS),
        },
    }
}

fn from_object(
    obj: &Map<String, Value>,
    raw: &str,
    policy: &NormalizePolicy,
) -> Normalization {
    let summary = lookup(obj, SUMMARY_KEYS)
        .map(coerce_summary)
        .unwrap_or_default();
    let confidence = lookup(obj, CONFIDENCE_KEYS)
        .and_then(coerce_confidence)
        .map(clamp_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let asset_type = resolve_asset_type(lookup(obj, ASSET_TYPE_KEYS), policy.require_asset_type);

    let token = lookup(obj, SIGNAL_KEYS).map(signal_token);
    let parsed = token.as_deref().and_then(Signal::from_token);

    let build = |signal: Signal| NormalizedSignal {
        signal,
        confidence,
        summary: summary.clone(),
        asset_type,
        duration_seconds: policy.duration_seconds,
    };

    let reason = match (parsed, token) {
        (Some(signal), _) if policy.vocabulary.allows(signal) => {
            return Normalization::Confident(build(signal));
        }
        (Some(signal), _) => DegradeReason::SignalNotAllowed(signal),
        (None, Some(token)) if !token.is_empty() => {
            DegradeReason::UnrecognizedSignal(truncate_chars(&token, 40))
        }
        (None, _) => DegradeReason::MissingSignal,
    };

    // Ternary answers never borrow a direction from the summary text.
    let substitute = match policy.vocabulary {
        SignalVocabulary::Ternary => policy.vocabulary.fallback(),
        SignalVocabulary::Binary => keyword_lean(&summary)
            .filter(|s| policy.vocabulary.allows(*s))
            .unwrap_or_else(|| policy.vocabulary.fallback()),
    };

    Normalization::Degraded {
        signal: build(substitute),
        reason,
        raw_excerpt: truncate_chars(raw, MAX_RAW_EXCERPT_CHARS),
    }
}

/// Degraded answer used when no object could be read.
fn fallback_signal(policy: &NormalizePolicy, lean: Option<Signal>, summary: &str) -> NormalizedSignal {
    let signal = lean
        .filter(|s| policy.vocabulary.allows(*s))
        .unwrap_or_else(|| policy.vocabulary.fallback());
    NormalizedSignal {
        signal,
        confidence: DEGRADED_CONFIDENCE,
        summary: summary.to_string(),
        asset_type: resolve_asset_type(None, policy.require_asset_type),
        duration_seconds: policy.duration_seconds,
    }
}

// ═══════════════════════════════════════════════════════════
// Field coercion
// ═══════════════════════════════════════════════════════════

/// First non-null value among `keys`.
fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn signal_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        _ => String::new(),
    }
}

fn coerce_summary(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    };
    truncate_chars(text.trim(), MAX_SUMMARY_CHARS)
}

/// Coerce a confidence value to an integer. Fractions in (0, 1) are
/// read as probabilities.
fn coerce_confidence(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_confidence)),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%').trim();
            match s.parse::<f64>() {
                Ok(f) => float_confidence(f),
                Err(_) => leading_integer(s),
            }
        }
        _ => None,
    }
}

fn float_confidence(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let scaled = if f > 0.0 && f < 1.0 {
        (f * 100.0).round()
    } else {
        f.trunc()
    };
    Some(scaled as i64)
}

/// `parseInt`-style read: optional sign then digits, rest ignored.
fn leading_integer(s: &str) -> Option<i64> {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Saturate absurdly long digit runs; they clamp to 100 anyway.
    let n = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * n)
}

fn clamp_confidence(n: i64) -> u8 {
    n.clamp(0, 100) as u8
}

fn resolve_asset_type(value: Option<&Value>, required: bool) -> Option<AssetType> {
    match value {
        Some(Value::String(s)) => Some(AssetType::from_token(s).unwrap_or(AssetType::Forex)),
        Some(_) => Some(AssetType::Forex),
        None if required => Some(AssetType::Forex),
        None => None,
    }
}

/// Count BUY-leaning against SELL-leaning words. `None` on a tie.
pub fn keyword_lean(text: &str) -> Option<Signal> {
    let mut buy = 0usize;
    let mut sell = 0usize;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if BUY_WORDS.contains(&word.as_str()) {
            buy += 1;
        } else if SELL_WORDS.contains(&word.as_str()) {
            sell += 1;
        }
    }
    match buy.cmp(&sell) {
        std::cmp::Ordering::Greater => Some(Signal::Buy),
        std::cmp::Ordering::Less => Some(Signal::Sell),
        std::cmp::Ordering::Equal => None,
    }
}

/// Truncate to at most `max_chars` chars, never splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
