#![deny(unsafe_code)]
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mew_gateway::{AppState, Gateway, build_app};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mew-gatewayd", version, about = "MEW workspace gateway")]
struct Args {
    /// Path to the space's TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("mew=debug")
    } else {
        EnvFilter::new("mew=info")
    };
    let format = std::env::var("MEW_LOG_FORMAT").unwrap_or_default();
    if format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = mew_config::load_config(&args.config)
        .with_context(|| format!("load space config {}", args.config.display()))?;
    let warnings = mew_config::validate_config(&config).context("validate space config")?;
    for warning in &warnings {
        tracing::warn!(%warning, "space config warning");
    }

    let bind_address = config.bind_address.clone();
    let space_id = config.space_id.clone();

    let gateway = Arc::new(Gateway::new(config).await.context("open audit log")?);
    let state = Arc::new(AppState { gateway });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("bind {bind_address}"))?;
    info!(bind = %bind_address, space_id = %space_id, "mew-gatewayd listening");

    axum::serve(listener, app).await.context("serve")
}
