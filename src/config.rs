//! Service configuration, loaded once at startup from the environment.
//!
//! The resulting `ServiceConfig` is read-only and shared behind an `Arc`;
//! nothing else in the crate reads environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::signal::{NormalizePolicy, SignalVocabulary};

/// Application-level constants
pub const APP_NAME: &str = "chart-signal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,chart_signal_lib=debug"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("ALLOWED_ORIGINS mixes '*' with explicit origins")]
    MixedCorsOrigins,
}

/// Cross-origin policy: wildcard or an explicit list, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    Any,
    List(Vec<String>),
}

impl CorsPolicy {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let entries: Vec<String> = raw
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let wildcard = entries.iter().any(|o| o == "*");
        match (wildcard, entries.len()) {
            (_, 0) => Ok(CorsPolicy::Any),
            (true, 1) => Ok(CorsPolicy::Any),
            (true, _) => Err(ConfigError::MixedCorsOrigins),
            (false, _) => Ok(CorsPolicy::List(entries)),
        }
    }
}

/// Which upstream answers analysis requests.
#[derive(Clone, PartialEq, Eq)]
pub enum UpstreamSettings {
    /// Call a hosted vision model directly.
    HostedModel {
        api_key: Option<String>,
        model: String,
        base_url: String,
    },
    /// Forward the upload to a separate inference service.
    Proxy { base_url: String },
}

impl std::fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamSettings::HostedModel {
                api_key,
                model,
                base_url,
            } => f
                .debug_struct("HostedModel")
                .field("api_key", &api_key.as_ref().map(|_| "<redacted>"))
                .field("model", model)
                .field("base_url", base_url)
                .finish(),
            UpstreamSettings::Proxy { base_url } => {
                f.debug_struct("Proxy").field("base_url", base_url).finish()
            }
        }
    }
}

/// Static configuration for one process.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub upstream_timeout: Duration,
    pub cors: CorsPolicy,
    pub vocabulary: SignalVocabulary,
    pub require_asset_type: bool,
    pub upstream: UpstreamSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: APP_NAME.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            upstream_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cors: CorsPolicy::Any,
            vocabulary: SignalVocabulary::Ternary,
            require_asset_type: false,
            upstream: UpstreamSettings::HostedModel {
                api_key: None,
                model: DEFAULT_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            },
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `get`, treating blank values as unset.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_ranged(var("PORT"), "PORT", DEFAULT_PORT, 1, u16::MAX)?;
        let upload_mb = parse_ranged(var("MAX_UPLOAD_MB"), "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB, 1, 64)?;
        let timeout_secs = parse_ranged(
            var("UPSTREAM_TIMEOUT_SECS"),
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
            1,
            600,
        )?;

        let cors = match var("ALLOWED_ORIGINS") {
            Some(raw) => CorsPolicy::parse(&raw)?,
            None => CorsPolicy::Any,
        };

        let vocabulary = match var("SIGNAL_MODE") {
            Some(raw) => SignalVocabulary::parse(&raw).ok_or(ConfigError::Invalid {
                var: "SIGNAL_MODE",
                reason: format!("expected 'ternary' or 'binary', got {raw:?}"),
            })?,
            None => SignalVocabulary::Ternary,
        };

        let require_asset_type = match var("REQUIRE_ASSET_TYPE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                var: "REQUIRE_ASSET_TYPE",
                reason: format!("expected a boolean, got {raw:?}"),
            })?,
            None => false,
        };

        let upstream = match var("AI_PROXY_URL") {
            Some(url) => UpstreamSettings::Proxy {
                base_url: validate_url("AI_PROXY_URL", &url)?,
            },
            None => UpstreamSettings::HostedModel {
                api_key: var("OPENAI_API_KEY"),
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: validate_url(
                    "OPENAI_BASE_URL",
                    &var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                )?,
            },
        };

        Ok(Self {
            service_name: var("SERVICE_NAME").unwrap_or_else(|| APP_NAME.to_string()),
            port,
            max_upload_bytes: upload_mb * 1024 * 1024,
            upstream_timeout: Duration::from_secs(timeout_secs),
            cors,
            vocabulary,
            require_asset_type,
            upstream,
        })
    }

    /// Problems that do not stop the process but make requests fail.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let UpstreamSettings::HostedModel { api_key: None, .. } = &self.upstream {
            warnings.push(
                "OPENAI_API_KEY is not set; analysis requests will fail with 500 until it is configured"
                    .to_string(),
            );
        }
        warnings
    }

    /// Normalization policy for a request with the given duration.
    pub fn normalize_policy(&self, duration_seconds: u32) -> NormalizePolicy {
        NormalizePolicy {
            vocabulary: self.vocabulary,
            require_asset_type: self.require_asset_type,
            duration_seconds,
        }
    }
}

fn parse_ranged<T>(raw: Option<String>, var: &'static str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: T = raw.parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("not a number: {raw:?}"),
    })?;
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(ConfigError::Invalid {
            var,
            reason: format!("expected an http(s) URL, got {raw:?}"),
        })
    }
}
