// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal JSON-RPC 2.0 message shapes, framed one object per line, and the
//! codec for encoding/decoding them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// A JSON-RPC 2.0 request expecting a response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlates the eventual [`JsonRpcResponse`].
    pub id: Value,
    /// The method name, e.g. `"tools/call"`.
    pub method: String,
    /// Method parameters.
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request with a freshly generated string id.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Value::String(id.into()),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification, with no response expected.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// The method name, e.g. `"notifications/initialized"`.
    pub method: String,
    /// Method parameters.
    pub params: Value,
}

impl JsonRpcNotification {
    /// Build a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Value,
}

/// A message received from the subprocess: either a response to one of our
/// requests, or an unsolicited server-to-client request/notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    /// A request or notification the server initiated. Tried first: any
    /// line carrying `method` is server-initiated, never a response.
    Inbound {
        /// Method name.
        method: String,
        /// Present on requests, absent on notifications.
        #[serde(default)]
        id: Option<Value>,
        /// Method parameters.
        #[serde(default)]
        params: Value,
    },
    /// A response (success or error) to a request we sent.
    Response {
        /// Echoed request id.
        id: Value,
        /// Present on success.
        #[serde(default)]
        result: Option<Value>,
        /// Present on failure.
        #[serde(default)]
        error: Option<JsonRpcError>,
    },
}

/// Stateless newline-delimited JSON codec for the messages exchanged with
/// an MCP server subprocess.
pub struct JsonlCodec;

impl JsonlCodec {
    /// Serialize a request to a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialize`] if the value cannot be serialized.
    pub fn encode_request(request: &JsonRpcRequest) -> Result<String, BridgeError> {
        let mut s = serde_json::to_string(request).map_err(BridgeError::Serialize)?;
        s.push('\n');
        Ok(s)
    }

    /// Serialize a notification to a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialize`] if the value cannot be serialized.
    pub fn encode_notification(notification: &JsonRpcNotification) -> Result<String, BridgeError> {
        let mut s = serde_json::to_string(notification).map_err(BridgeError::Serialize)?;
        s.push('\n');
        Ok(s)
    }

    /// Deserialize a single JSON line into an [`InboundMessage`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Deserialize`] if the line is not valid JSON
    /// matching either shape.
    pub fn decode(line: &str) -> Result<InboundMessage, BridgeError> {
        serde_json::from_str(line).map_err(BridgeError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_success_response() {
        let line = r#"{"jsonrpc":"2.0","id":"r-1","result":{"ok":true}}"#;
        let msg = JsonlCodec::decode(line).unwrap();
        match msg {
            InboundMessage::Response { id, result, error } => {
                assert_eq!(id, json!("r-1"));
                assert_eq!(result, Some(json!({"ok": true})));
                assert!(error.is_none());
            }
            InboundMessage::Inbound { .. } => panic!("expected response"),
        }
    }

    #[test]
    fn decodes_error_response() {
        let line = r#"{"jsonrpc":"2.0","id":"r-1","error":{"code":-32601,"message":"no such method"}}"#;
        let msg = JsonlCodec::decode(line).unwrap();
        match msg {
            InboundMessage::Response { error: Some(err), .. } => {
                assert_eq!(err.code, -32601);
            }
            _ => panic!("expected error response"),
        }
    }

    #[test]
    fn decodes_server_notification() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"pct":50}}"#;
        let msg = JsonlCodec::decode(line).unwrap();
        match msg {
            InboundMessage::Inbound { method, id, .. } => {
                assert_eq!(method, "notifications/progress");
                assert!(id.is_none());
            }
            InboundMessage::Response { .. } => panic!("expected inbound notification"),
        }
    }

    #[test]
    fn round_trips_request_encoding() {
        let request = JsonRpcRequest::new("r-1", "tools/list", json!({}));
        let line = JsonlCodec::encode_request(&request).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"method\":\"tools/list\""));
    }
}
