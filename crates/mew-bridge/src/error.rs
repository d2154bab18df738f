// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for MCP subprocess I/O and protocol handling.

use thiserror::Error;

/// Errors from an MCP server subprocess and the JSON-RPC bridge around it.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn mcp server: {0}")]
    Spawn(#[source] std::io::Error),
    /// Failed to read from the subprocess's stdout.
    #[error("failed to read mcp server stdout: {0}")]
    Stdout(#[source] std::io::Error),
    /// Failed to write to the subprocess's stdin.
    #[error("failed to write mcp server stdin: {0}")]
    Stdin(#[source] std::io::Error),
    /// The subprocess sent a line that was not valid JSON-RPC.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// A request or notification could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
    /// A response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),
    /// The subprocess answered a call with a JSON-RPC error object.
    #[error("mcp server error {code}: {message}")]
    JsonRpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The subprocess exited while a call was outstanding.
    #[error("mcp server exited unexpectedly (code={0:?})")]
    Exited(Option<i32>),
    /// A call did not receive a response in time.
    #[error("mcp server call timed out")]
    Timeout,
    /// The subprocess crashed more times in a row than the restart policy allows.
    #[error("mcp server exceeded its restart limit")]
    RestartLimitExceeded,
}
