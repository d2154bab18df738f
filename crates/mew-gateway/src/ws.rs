// SPDX-License-Identifier: MIT OR Apache-2.0
//! WebSocket transport: upgrades an HTTP connection into a participant
//! session and bridges envelope JSON frames to [`Gateway::ingest`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use mew_types::{Envelope, EnvelopeBuilder, kinds};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::AppState;

/// `GET /ws?token=<bearer>` — upgrades to a WebSocket-framed participant
/// session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = params.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, token: String) {
    let session = match state.gateway.admit(&token).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "admission rejected");
            let _ = socket
                .send(Message::Text(json!({"error": err.to_string()}).to_string().into()))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_frame(&state, &session, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        handle_inbound_frame(&state, &session, &bytes).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket recv error");
                        break;
                    }
                }
            }
            outgoing = session.outbound.dequeue() => {
                match outgoing {
                    Some(envelope) => {
                        let Ok(bytes) = envelope.to_wire_bytes() else { continue };
                        if socket.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.gateway.close(&session.identity, Some("disconnect".into()));
    info!(identity = %session.identity, "websocket connection closed");
}

async fn handle_inbound_frame(state: &Arc<AppState>, session: &Arc<crate::session::SessionRecord>, bytes: &[u8]) {
    match Envelope::parse(bytes) {
        Ok(envelope) => {
            if let Err(err) = state.gateway.ingest(session, envelope).await {
                warn!(error = %err, identity = %session.identity, "ingest failed");
            }
        }
        Err(err) => {
            // Malformed envelopes are rejected directly, without an audit entry.
            let error = EnvelopeBuilder::new(kinds::SYSTEM_ERROR)
                .from("gateway")
                .to(&session.identity)
                .payload(json!({"code": "MEW-P001", "reason": "malformed", "detail": err.to_string()}))
                .build()
                .expect("system/error envelope is always well-formed");
            session.outbound.try_enqueue(error);
        }
    }
}
