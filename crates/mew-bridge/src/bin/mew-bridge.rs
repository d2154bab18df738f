#![deny(unsafe_code)]
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mew_bridge::{register_discovered_tools, McpBridge, McpServerSpec};
use mew_participant::{ConnectConfig, ParticipantRuntime};
use mew_types::{kinds, EnvelopeBuilder};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mew-bridge", version, about = "Bridges a local MCP server subprocess onto a MEW gateway participant")]
struct Args {
    /// Gateway WebSocket URL, e.g. `ws://localhost:8080/ws`.
    #[arg(long)]
    gateway_url: String,

    /// Identity to connect as.
    #[arg(long)]
    identity: String,

    /// Bearer token presented during admission.
    #[arg(long)]
    token: String,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,

    /// The MCP server command to run, followed by its own arguments.
    #[arg(last = true, required = true)]
    command: Vec<String>,
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

    let (command, command_args) = args.command.split_first().context("missing MCP server command")?;
    let mut spec = McpServerSpec::new(command.clone());
    for arg in command_args {
        spec = spec.arg(arg.clone());
    }

    let bridge = McpBridge::start(spec).await.context("start mcp server subprocess")?;
    info!(command = %command, "mcp server subprocess ready");

    let config = ConnectConfig::new(args.gateway_url.clone(), args.identity.clone(), args.token.clone());
    let runtime = ParticipantRuntime::connect(config).await.context("connect to gateway")?;
    info!(identity = %args.identity, gateway = %args.gateway_url, "participant connected");

    let tools = register_discovered_tools(&bridge, &runtime).await.context("discover mcp server tools")?;
    info!(count = tools.len(), tools = ?tools, "registered proxied tools");

    let crash_runtime = runtime.clone();
    bridge.on_crash(move |err| {
        warn!(error = %err, "mcp server subprocess crashed, notifying space");
        let builder = EnvelopeBuilder::new(kinds::SYSTEM_ERROR).payload(serde_json::json!({
            "message": format!("mcp server subprocess crashed: {err}"),
        }));
        let runtime = crash_runtime.clone();
        tokio::spawn(async move {
            if let Err(err) = runtime.send(builder).await {
                warn!(error = %err, "failed to broadcast mcp server crash");
            }
        });
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    runtime.shutdown();
    bridge.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
