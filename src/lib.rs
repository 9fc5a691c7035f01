pub mod api;
pub mod config;
pub mod signal;
pub mod upstream;

#[cfg(test)]
mod test_support;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{start_server_on, ApiContext};
use crate::config::{ConfigError, ServiceConfig};
use crate::upstream::{build_upstream, UpstreamError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Cannot build upstream client: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("{0}")]
    Server(String),
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Load configuration, serve until Ctrl-C, then drain and stop.
pub async fn run() -> Result<(), StartupError> {
    // A missing .env file is normal in production.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "configuration rejected");
        e
    })?;
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }

    let upstream = build_upstream(&config)?;
    tracing::info!(
        service = %config.service_name,
        port = config.port,
        upstream = upstream.name(),
        vocabulary = ?config.vocabulary,
        require_asset_type = config.require_asset_type,
        max_upload_bytes = config.max_upload_bytes,
        timeout_secs = config.upstream_timeout.as_secs(),
        cors = ?config.cors,
        "configuration loaded"
    );

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    let ctx = ApiContext::new(Arc::new(config), upstream);
    let mut server = start_server_on(ctx, addr)
        .await
        .map_err(StartupError::Server)?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }

    server.shutdown();
    server.stopped().await;
    Ok(())
}
