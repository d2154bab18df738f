// SPDX-License-Identifier: MIT OR Apache-2.0
//! Low-level subprocess spawning and stdio management for a single MCP
//! server run (no restart logic — that lives in [`crate::supervisor`]).

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::warn;

use crate::error::BridgeError;
use crate::jsonrpc::{InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonlCodec};
use crate::spec::McpServerSpec;

/// One running instance of an MCP server subprocess, communicating over
/// newline-delimited JSON-RPC on stdin/stdout.
pub struct McpServerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

impl McpServerProcess {
    /// Spawn the subprocess. Stderr is forwarded through `tracing` at warn
    /// level, one line at a time.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Spawn`] if the command cannot be started, or
    /// [`BridgeError::Protocol`] if stdio could not be captured.
    pub async fn spawn(spec: &McpServerSpec) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(BridgeError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Protocol("stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Protocol("stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let trimmed = line.trim_end();
                            if !trimmed.is_empty() {
                                warn!(target: "mew_bridge.stderr", "{trimmed}");
                            }
                        }
                    }
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send a request to the subprocess's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialize`] or [`BridgeError::Stdin`].
    pub async fn send_request(&mut self, request: &JsonRpcRequest) -> Result<(), BridgeError> {
        let line = JsonlCodec::encode_request(request)?;
        self.write_line(&line).await
    }

    /// Send a notification (no response expected) to the subprocess's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialize`] or [`BridgeError::Stdin`].
    pub async fn send_notification(&mut self, notification: &JsonRpcNotification) -> Result<(), BridgeError> {
        let line = JsonlCodec::encode_notification(notification)?;
        self.write_line(&line).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), BridgeError> {
        self.stdin.write_all(line.as_bytes()).await.map_err(BridgeError::Stdin)?;
        self.stdin.flush().await.map_err(BridgeError::Stdin)
    }

    /// Read the next message from the subprocess's stdout, or `None` on EOF.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Stdout`] or [`BridgeError::Deserialize`].
    pub async fn recv(&mut self) -> Result<Option<InboundMessage>, BridgeError> {
        let mut buf = String::new();
        let n = self.stdout.read_line(&mut buf).await.map_err(BridgeError::Stdout)?;
        if n == 0 {
            return Ok(None);
        }
        let line = buf.trim_end();
        if line.is_empty() {
            return Ok(None);
        }
        JsonlCodec::decode(line).map(Some)
    }

    /// The subprocess's exit code, if it has already exited.
    pub fn try_exit_code(&mut self) -> Option<Option<i32>> {
        self.child.try_wait().ok().flatten().map(|status| status.code())
    }

    /// Kill the subprocess and wait for it to exit.
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}
