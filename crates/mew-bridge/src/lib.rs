// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Bridges a local MCP server subprocess onto a MEW participant: supervises
//! the subprocess over stdio JSON-RPC, discovers its tools, and proxies
//! `mcp/request`s addressed to the bridging participant down to it.

/// Error taxonomy.
pub mod error;
/// JSON-RPC message shapes and their newline-delimited codec.
pub mod jsonrpc;
/// Low-level subprocess spawning and stdio management.
pub mod process;
/// Process and restart-policy specification.
pub mod spec;
/// Restart-supervised connection to one MCP server subprocess.
pub mod supervisor;

pub use error::BridgeError;
pub use jsonrpc::{InboundMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonlCodec};
pub use process::McpServerProcess;
pub use spec::McpServerSpec;
pub use supervisor::{McpBridge, DEFAULT_CALL_TIMEOUT};

use std::sync::Arc;

use async_trait::async_trait;
use mew_participant::{ParticipantRuntime, ToolExecutor};
use serde_json::{json, Value};

/// A [`ToolExecutor`] that proxies `tools/call` onto a bridged MCP server
/// subprocess, so every tool the subprocess advertises can be registered on
/// a participant without bespoke glue per tool.
pub struct ProxyTool {
    bridge: Arc<McpBridge>,
    remote_name: String,
}

impl ProxyTool {
    /// Wrap a bridge so calls are forwarded as `tools/call` for
    /// `remote_name` on the subprocess.
    #[must_use]
    pub fn new(bridge: Arc<McpBridge>, remote_name: impl Into<String>) -> Self {
        Self {
            bridge,
            remote_name: remote_name.into(),
        }
    }
}

#[async_trait]
impl ToolExecutor for ProxyTool {
    async fn call(&self, arguments: Value) -> Result<Value, String> {
        self.bridge
            .call(
                "tools/call",
                json!({"name": self.remote_name, "arguments": arguments}),
                DEFAULT_CALL_TIMEOUT,
            )
            .await
            .map_err(|err| err.to_string())
    }
}

/// Discover every tool a bridged subprocess advertises and register a
/// [`ProxyTool`] for each on `runtime`, so inbound `mcp/request`s the
/// participant observes are dispatched straight through to the subprocess.
///
/// # Errors
///
/// Returns [`BridgeError`] if discovery fails, or if the subprocess's
/// `tools/list` response is not shaped as `{"tools": [{"name": ...}, ...]}`.
pub async fn register_discovered_tools(bridge: &Arc<McpBridge>, runtime: &ParticipantRuntime) -> Result<Vec<String>, BridgeError> {
    let discovered = bridge.discover_tools().await?;
    let tools = discovered
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::Protocol("tools/list result missing 'tools' array".into()))?;

    let mut names = Vec::new();
    for tool in tools {
        let Some(name) = tool.get("name").and_then(Value::as_str) else {
            continue;
        };
        runtime.register_tool(name, Arc::new(ProxyTool::new(bridge.clone(), name)));
        names.push(name.to_string());
    }
    Ok(names)
}
