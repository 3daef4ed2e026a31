//! resume-range server binary.

use std::net::IpAddr;

use anyhow::{Context, Result};
use clap::Parser;
use resume_range::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use resume_range::logging::init_logging;
use resume_range::routes::{create_router, AppState};
use resume_range::{RangeBody, ResourceStore};
use tokio::net::TcpListener;

/// Serves one synthetic resource with byte-range, If-Range and multipart support
#[derive(Parser, Debug)]
#[command(name = "resume-range")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "RESUME_RANGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServerConfig::load(&args.config).context("failed to load configuration")?;
    init_logging(config.log_format);
    tracing::info!("resume-range v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(config_path = %args.config, ?config, "configuration loaded");

    let store = ResourceStore::synthetic(config.content_size)
        .context("failed to build resource store")?;
    tracing::info!(
        raw_size = store.raw().byte_size(),
        raw_etag = %store.raw().current_validator().etag,
        gzip_size = store.gzip().byte_size(),
        gzip_etag = %store.gzip().current_validator().etag,
        last_modified = %store.raw().current_validator().last_modified_http(),
        "resource store ready"
    );

    let state = AppState::new(store, config.boundary_policy());
    let router = create_router(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr().context("failed to read local address")?;

    let host = match local_addr.ip() {
        ip if ip.is_unspecified() => "localhost".to_string(),
        IpAddr::V6(ip) => format!("[{ip}]"),
        ip => ip.to_string(),
    };
    tracing::info!(bind = %local_addr, random_boundary = config.random_boundary, "listening");
    tracing::info!("browse http://{}:{}/file", host, local_addr.port());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
