// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Workspace gateway: hosts a single named space, admits participant
//! sessions over WebSocket, enforces capability rules on every envelope,
//! routes to addressed or broadcast recipients, and appends the durable
//! audit log.

/// Append-only audit log writer.
pub mod audit;
/// Gateway-level error taxonomy.
pub mod error;
/// Gateway core: admission, ingest, capability grant/revoke, session close.
pub mod gateway;
/// Per-identity session records and registry.
pub mod session;
/// WebSocket transport.
pub mod ws;

pub use error::GatewayError;
pub use gateway::{Gateway, IngestOutcome};
pub use session::{SessionRecord, SessionRegistry};

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use mew_types::{Envelope, EnvelopeBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

/// Shared application state handed to every axum route.
pub struct AppState {
    /// The single space this gateway instance hosts.
    pub gateway: Arc<Gateway>,
}

/// Uniform JSON error response for the REST control surface.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Construct an API error with the given status and message.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::DuplicateIdentity(_) => StatusCode::CONFLICT,
            GatewayError::SpaceClosed => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::IdentityMismatch => StatusCode::FORBIDDEN,
            GatewayError::Malformed(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnknownSession(_) => StatusCode::NOT_FOUND,
            GatewayError::AuditIoFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build the axum router serving the space's WebSocket and REST surfaces.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ws", get(ws::ws_handler))
        .route("/participants/{identity}/messages", post(cmd_post_message))
        .route("/sessions", get(cmd_list_sessions))
        .with_state(state)
}

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": if state.gateway.is_fatal() { "fatal" } else { "ok" },
        "space_id": state.gateway.config().space_id,
        "time": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    kind: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    correlation_id: Vec<String>,
    #[serde(default)]
    payload: Value,
}

/// Non-interactive REST entry point for a participant's own envelopes,
/// for clients that do not keep a live WebSocket connection open (e.g. a
/// one-shot MCP bridge invocation). Still flows through the same
/// [`Gateway::ingest`] capability and routing path. Responds `202` once the
/// envelope is admitted and routed, or `403` if the sender's capabilities
/// deny it outright.
async fn cmd_post_message(
    axum::extract::Path(identity): axum::extract::Path<String>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = state
        .gateway
        .sessions()
        .get(&identity)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no active session for '{identity}'")))?;

    let mut builder = EnvelopeBuilder::new(req.kind).from(identity).to_all(req.to).payload(req.payload);
    for id in req.correlation_id {
        builder = builder.correlates(id);
    }
    let envelope: Envelope = builder.build().map_err(GatewayError::Malformed)?;

    let outcome = state.gateway.ingest(&session, envelope).await?;
    match outcome {
        IngestOutcome::Delivered => {
            Ok((StatusCode::ACCEPTED, Json(json!({ "outcome": "delivered" }))))
        }
        IngestOutcome::Denied { reason } => {
            Ok((StatusCode::FORBIDDEN, Json(json!({ "outcome": "denied", "reason": reason }))))
        }
    }
}

async fn cmd_list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let identities: Vec<String> = state
        .gateway
        .sessions()
        .all_active()
        .into_iter()
        .map(|s| s.identity.clone())
        .collect();
    Json(identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_config::{ParticipantConfig, SpaceConfig};
    use mew_types::CapabilityPattern;
    use tower::ServiceExt;

    async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SpaceConfig {
            space_id: "demo".into(),
            bind_address: "127.0.0.1:0".into(),
            audit_log_path: Some(dir.path().join("audit.log.jsonl").to_string_lossy().to_string()),
            recipient_queue_capacity: 8,
            overflow_policy: mew_config::OverflowPolicy::CloseSlowRecipient,
            duplicate_identity_policy: mew_config::DuplicateIdentityPolicy::Reject,
            participants: vec![ParticipantConfig {
                identity: "alice".into(),
                token: "tok-alice".into(),
                capabilities: vec![CapabilityPattern::kind_only("chat")],
            }],
        };
        let gateway = Arc::new(Gateway::new(config).await.unwrap());
        (Arc::new(AppState { gateway }), dir)
    }

    #[tokio::test]
    async fn health_reports_space_id() {
        let (state, _dir) = test_state().await;
        let app = build_app(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn admit_alice(state: &Arc<AppState>) {
        state.gateway.admit("tok-alice").await.unwrap();
    }

    #[tokio::test]
    async fn post_message_admitted_is_accepted() {
        let (state, _dir) = test_state().await;
        admit_alice(&state).await;
        let app = build_app(state);
        let body = json!({"kind": "chat", "payload": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/participants/alice/messages")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn post_message_denied_by_capability_is_forbidden() {
        let (state, _dir) = test_state().await;
        admit_alice(&state).await;
        let app = build_app(state);
        let body = json!({"kind": "mcp/request", "payload": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/participants/alice/messages")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_message_without_session_is_not_found() {
        let (state, _dir) = test_state().await;
        let app = build_app(state);
        let body = json!({"kind": "chat", "payload": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/participants/alice/messages")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
