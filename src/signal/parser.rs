//! Locate a JSON object inside untrusted upstream text.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or in a
//! fenced code block. Candidates are tried in order: the whole text, the
//! first fenced block, then every balanced `{...}` block left to right.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Upper bound on the text the balanced-brace scan will walk.
const MAX_SCAN_BYTES: usize = 64 * 1024;
/// Upper bound on `{` positions tried as block starts.
const MAX_CANDIDATES: usize = 64;

/// Which strategy produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    Direct,
    Fenced,
    Embedded,
}

static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid regex"));

/// Find the first JSON object in `text`.
pub fn extract_json_object(text: &str) -> Option<(Map<String, Value>, ExtractionPath)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(obj) = parse_object(trimmed) {
        return Some((obj, ExtractionPath::Direct));
    }

    if let Some(body) = FENCED_BLOCK_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
    {
        if let Some(obj) = parse_object(body) {
            return Some((obj, ExtractionPath::Fenced));
        }
    }

    let scan = safe_prefix(trimmed, MAX_SCAN_BYTES);
    let mut from = 0;
    let mut tried = 0;
    while let Some(offset) = scan[from..].find('{') {
        if tried == MAX_CANDIDATES {
            break;
        }
        tried += 1;
        let start = from + offset;
        if let Some(end) = balanced_block_end(&scan[start..]) {
            if let Some(obj) = parse_object(&scan[start..start + end]) {
                return Some((obj, ExtractionPath::Embedded));
            }
        }
        from = start + 1;
    }

    None
}

/// Parse `candidate` as a JSON object. A JSON string holding an object
/// (double-encoded output) is unwrapped once.
fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate).ok()? {
        Value::Object(map) => Some(map),
        Value::String(inner) => match serde_json::from_str::<Value>(inner.trim()).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Byte length of the balanced `{...}` block at the start of `text`.
///
/// Braces inside string literals are ignored, escapes are honoured.
fn balanced_block_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
fn safe_prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
