// SPDX-License-Identifier: MIT OR Apache-2.0
//! The participant runtime: a reusable client that holds a WebSocket
//! connection to a gateway open, reconnects with backoff when it drops,
//! enforces a local fast-fail capability check before sending, and
//! auto-dispatches incoming `mcp/request`s against registered tools,
//! resources, and prompts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mew_correlation::{CorrelationError, PendingTable, ProposalTracker};
use mew_types::{kinds, CapabilityPattern, Envelope, EnvelopeBuilder};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_tungstenite::tungstenite::Message;

use crate::config::ConnectConfig;
use crate::error::ParticipantError;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::stream::{StreamHandle, StreamTable};

/// Default deadline for an outgoing `mcp/request` awaiting a direct response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default deadline a proposal is swept under if expressed without one.
pub const DEFAULT_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(60);

type MessageHandler = dyn Fn(Envelope) + Send + Sync;

/// A connected, auto-reconnecting participant. Cheaply cloneable via `Arc`;
/// [`ParticipantRuntime::connect`] returns one already wrapped.
pub struct ParticipantRuntime {
    identity: String,
    config: ConnectConfig,
    capabilities: Mutex<Vec<CapabilityPattern>>,
    outgoing: PendingTable<Value>,
    proposals: ProposalTracker,
    streams: StreamTable,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    handler: Mutex<Option<Arc<MessageHandler>>>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    shutdown: Notify,
    stopping: AtomicBool,
}

impl ParticipantRuntime {
    fn new(config: ConnectConfig) -> Self {
        Self {
            identity: config.identity.clone(),
            config,
            capabilities: Mutex::new(Vec::new()),
            outgoing: PendingTable::new(),
            proposals: ProposalTracker::new(),
            streams: StreamTable::new(),
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
            handler: Mutex::new(None),
            outbound_tx: Mutex::new(None),
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Open a connection to the gateway named in `config`, blocking until
    /// either `system/welcome` is received or `config.handshake_timeout`
    /// elapses. The returned runtime keeps reconnecting with capped
    /// exponential backoff for the rest of its lifetime, until
    /// [`ParticipantRuntime::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ParticipantError::Transport`] if the initial connection is
    /// refused, or [`ParticipantError::HandshakeTimeout`] if no welcome
    /// arrives in time.
    pub async fn connect(config: ConnectConfig) -> Result<Arc<Self>, ParticipantError> {
        let runtime = Arc::new(Self::new(config));
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(runtime.clone().supervise(ready_tx));
        tokio::spawn(runtime.clone().sweep_loop());

        match tokio::time::timeout(runtime.config.handshake_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(runtime),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(ParticipantError::NotConnected),
            Err(_) => Err(ParticipantError::HandshakeTimeout),
        }
    }

    /// Stop reconnecting and close any live connection.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// This participant's identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Snapshot of the capability patterns currently assigned by the
    /// gateway, as of the last `system/welcome` or `capability/grant`.
    #[must_use]
    pub fn capabilities(&self) -> Vec<CapabilityPattern> {
        self.capabilities.lock().expect("capability mutex poisoned").clone()
    }

    /// Register a callback invoked for every envelope observed, including
    /// ones auto-dispatched against a registered tool/resource/prompt.
    pub fn on_message(&self, handler: impl Fn(Envelope) + Send + Sync + 'static) {
        *self.handler.lock().expect("handler mutex poisoned") = Some(Arc::new(handler));
    }

    /// Register a locally runnable tool.
    pub fn register_tool(&self, name: impl Into<String>, executor: Arc<dyn crate::registry::ToolExecutor>) {
        self.tools.register(name, executor);
    }

    /// Register a locally servable resource.
    pub fn register_resource(&self, uri: impl Into<String>, provider: Arc<dyn crate::registry::ResourceProvider>) {
        self.resources.register(uri, provider);
    }

    /// Register a locally renderable prompt.
    pub fn register_prompt(&self, name: impl Into<String>, provider: Arc<dyn crate::registry::PromptProvider>) {
        self.prompts.register(name, provider);
    }

    /// Send a partially built envelope, filling `from` with this
    /// participant's identity. Runs a local fast-fail capability check
    /// against the last-known capability set before handing it to the
    /// transport, so an obviously-denied send never round-trips the
    /// gateway only to be rejected there.
    ///
    /// # Errors
    ///
    /// Returns [`ParticipantError::LocalCapabilityDenied`] if no assigned
    /// capability pattern matches, or [`ParticipantError::NotConnected`] if
    /// no connection is currently live.
    pub async fn send(&self, builder: EnvelopeBuilder) -> Result<Envelope, ParticipantError> {
        let envelope = builder.from(self.identity.clone()).build()?;
        let caps = self.capabilities();
        if !mew_capability::permits(&caps, &envelope) {
            return Err(ParticipantError::LocalCapabilityDenied(envelope.kind.clone()));
        }
        self.send_raw(&envelope)?;
        Ok(envelope)
    }

    fn send_raw(&self, envelope: &Envelope) -> Result<(), ParticipantError> {
        let bytes = envelope.to_wire_bytes()?;
        let tx = self
            .outbound_tx
            .lock()
            .expect("outbound sender mutex poisoned")
            .clone()
            .ok_or(ParticipantError::NotConnected)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        tx.send(Message::Text(text.into())).map_err(|_| ParticipantError::NotConnected)
    }

    /// Send a direct `mcp/request` to `to` and await its `mcp/response`.
    ///
    /// # Errors
    ///
    /// See [`ParticipantRuntime::send`]. Resolves with
    /// [`ParticipantError::Correlation`] carrying [`CorrelationError::Timeout`]
    /// if no response arrives within `timeout`.
    pub async fn mcp_request(
        &self,
        to: Vec<String>,
        method: impl Into<String>,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ParticipantError> {
        let builder = EnvelopeBuilder::new(kinds::MCP_REQUEST)
            .to_all(to)
            .payload(json!({"method": method.into(), "params": params}));
        let sent = self.send(builder).await?;
        let rx = self.outgoing.register(sent.id.clone(), timeout);
        await_resolution(rx).await
    }

    /// Broadcast an `mcp/proposal` and await whichever fulfiller's response
    /// closes the chain first, per the proposal/fulfillment flow.
    ///
    /// # Errors
    ///
    /// Resolves with [`CorrelationError::ProposalUnfulfilled`] if no
    /// fulfiller's request is observed in time, or
    /// [`CorrelationError::FulfillmentTimeout`] if one is observed but never
    /// answered.
    pub async fn propose(
        &self,
        method: impl Into<String>,
        params: Value,
        unfulfilled_timeout: Duration,
    ) -> Result<Value, ParticipantError> {
        let builder = EnvelopeBuilder::new(kinds::MCP_PROPOSAL).payload(json!({"method": method.into(), "params": params}));
        let sent = self.send(builder).await?;
        let rx = self.proposals.propose(sent.id.clone(), unfulfilled_timeout);
        await_resolution(rx).await
    }

    /// Ask a peer to open a byte/chunk stream, awaiting its `stream/open`
    /// acknowledgement.
    ///
    /// # Errors
    ///
    /// See [`ParticipantRuntime::send`] and [`ParticipantRuntime::mcp_request`].
    pub async fn request_stream(
        &self,
        to: impl Into<String>,
        metadata: Value,
        timeout: Duration,
    ) -> Result<Arc<StreamHandle>, ParticipantError> {
        let peer = to.into();
        let builder = EnvelopeBuilder::new(kinds::STREAM_REQUEST).to(peer.clone()).payload(metadata);
        let sent = self.send(builder).await?;
        let rx = self.outgoing.register(sent.id.clone(), timeout);
        let opened = await_resolution(rx).await?;
        let stream_id = opened
            .get("stream_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ParticipantError::Remote("stream/open missing stream_id".into()))?;
        Ok(self.streams.open(stream_id, Some(peer)))
    }

    /// Send one chunk of data on an already-open stream.
    ///
    /// # Errors
    ///
    /// See [`ParticipantRuntime::send`].
    pub async fn send_stream_data(&self, stream_id: &str, data: Value) -> Result<(), ParticipantError> {
        let handle = self
            .streams
            .get(stream_id)
            .ok_or_else(|| ParticipantError::Remote(format!("unknown stream '{stream_id}'")))?;
        let mut builder = EnvelopeBuilder::new(kinds::STREAM_DATA)
            .correlates(stream_id)
            .payload(json!({"seq": handle.next_sequence(), "data": data}));
        if let Some(peer) = &handle.peer {
            builder = builder.to(peer.clone());
        }
        self.send(builder).await?;
        Ok(())
    }

    /// Close a stream, notifying its peer.
    ///
    /// # Errors
    ///
    /// See [`ParticipantRuntime::send`].
    pub async fn close_stream(&self, stream_id: &str) -> Result<(), ParticipantError> {
        let peer = self.streams.close(stream_id).and_then(|h| h.peer.clone());
        let mut builder = EnvelopeBuilder::new(kinds::STREAM_CLOSE).correlates(stream_id);
        if let Some(peer) = peer {
            builder = builder.to(peer);
        }
        self.send(builder).await?;
        Ok(())
    }

    /// Ask a peer to list its locally registered tools, via a direct
    /// `mcp/request` for `tools/list`.
    ///
    /// # Errors
    ///
    /// See [`ParticipantRuntime::mcp_request`].
    pub async fn discover_tools(&self, peer: impl Into<String>) -> Result<Value, ParticipantError> {
        self.mcp_request(vec![peer.into()], "tools/list", json!({}), DEFAULT_REQUEST_TIMEOUT).await
    }

    async fn supervise(self: Arc<Self>, mut ready_tx: Option<oneshot::Sender<Result<(), ParticipantError>>>) {
        let mut backoff = self.config.reconnect_initial_backoff;
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            match self.connect_once(&mut ready_tx).await {
                Ok(()) => backoff = self.config.reconnect_initial_backoff,
                Err(err) => {
                    tracing::warn!(error = %err, identity = %self.identity, "connection attempt failed");
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = self.shutdown.notified() => return,
            }
            backoff = (backoff * 2).min(self.config.reconnect_max_backoff);
        }
    }

    async fn connect_once(
        self: &Arc<Self>,
        ready_tx: &mut Option<oneshot::Sender<Result<(), ParticipantError>>>,
    ) -> Result<(), ParticipantError> {
        let url = format!("{}?token={}", self.config.gateway_url, self.config.token);
        let (stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|err| ParticipantError::Transport(err.to_string()))?;
        let (mut write, mut read) = stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound_tx.lock().expect("outbound sender mutex poisoned") = Some(tx);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_inbound(text.as_bytes(), ready_tx).await,
                        Some(Ok(Message::Binary(bytes))) => self.handle_inbound(&bytes, ready_tx).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(error = %err, "websocket recv error");
                            break;
                        }
                    }
                }
                () = self.shutdown.notified() => break,
            }
        }

        *self.outbound_tx.lock().expect("outbound sender mutex poisoned") = None;
        writer.abort();
        Ok(())
    }

    async fn handle_inbound(
        self: &Arc<Self>,
        bytes: &[u8],
        ready_tx: &mut Option<oneshot::Sender<Result<(), ParticipantError>>>,
    ) {
        let envelope = match Envelope::parse(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed inbound envelope");
                return;
            }
        };

        match envelope.kind.as_str() {
            kinds::SYSTEM_WELCOME => {
                self.adopt_welcome(&envelope);
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            kinds::CAPABILITY_GRANT => self.apply_grant(&envelope),
            kinds::CAPABILITY_REVOKE => self.apply_revoke(&envelope),
            kinds::MCP_RESPONSE => {
                if let Some(id) = envelope.primary_correlation() {
                    self.outgoing.resolve(id, envelope.payload.clone());
                }
            }
            kinds::STREAM_OPEN => {
                if let Some(id) = envelope.primary_correlation() {
                    self.outgoing.resolve(id, envelope.payload.clone());
                }
            }
            kinds::STREAM_CLOSE => {
                if let Some(id) = envelope.primary_correlation() {
                    self.streams.close(id);
                }
            }
            kinds::MCP_REQUEST => {
                let this = self.clone();
                let envelope = envelope.clone();
                tokio::spawn(async move { this.auto_dispatch(envelope).await });
            }
            _ => {}
        }

        self.proposals.observe_envelope(&envelope, DEFAULT_PROPOSAL_TIMEOUT);

        if let Some(handler) = self.handler.lock().expect("handler mutex poisoned").clone() {
            handler(envelope);
        }
    }

    fn adopt_welcome(&self, envelope: &Envelope) {
        let Some(caps) = envelope.payload.get("capabilities") else { return };
        if let Ok(caps) = serde_json::from_value::<Vec<CapabilityPattern>>(caps.clone()) {
            *self.capabilities.lock().expect("capability mutex poisoned") = caps;
        }
    }

    fn apply_grant(&self, envelope: &Envelope) {
        let Some(caps) = envelope.payload.get("capabilities") else { return };
        let Ok(mut granted) = serde_json::from_value::<Vec<CapabilityPattern>>(caps.clone()) else { return };
        self.capabilities.lock().expect("capability mutex poisoned").append(&mut granted);
        let ack = EnvelopeBuilder::new(kinds::CAPABILITY_GRANT_ACK)
            .from(self.identity.clone())
            .to(envelope.from.clone())
            .correlates(envelope.id.clone())
            .build();
        if let Ok(ack) = ack {
            let _ = self.send_raw(&ack);
        }
    }

    fn apply_revoke(&self, envelope: &Envelope) {
        let Some(caps) = envelope.payload.get("capabilities") else { return };
        let Ok(revoked) = serde_json::from_value::<Vec<CapabilityPattern>>(caps.clone()) else { return };
        self.capabilities
            .lock()
            .expect("capability mutex poisoned")
            .retain(|pattern| !revoked.contains(pattern));
    }

    async fn auto_dispatch(self: Arc<Self>, envelope: Envelope) {
        let method = envelope.payload.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = envelope.payload.get("params").cloned().unwrap_or(Value::Null);

        let result = match method {
            "tools/call" => match params.get("name").and_then(Value::as_str) {
                Some(name) => match self.tools.get(name) {
                    Some(tool) => tool.call(params.get("arguments").cloned().unwrap_or(Value::Null)).await,
                    None => Err(format!("no tool registered as '{name}'")),
                },
                None => Err("tools/call missing params.name".to_string()),
            },
            "resources/read" => match params.get("uri").and_then(Value::as_str) {
                Some(uri) => match self.resources.get(uri) {
                    Some(resource) => resource.read(uri).await,
                    None => Err(format!("no resource registered for '{uri}'")),
                },
                None => Err("resources/read missing params.uri".to_string()),
            },
            "prompts/get" => match params.get("name").and_then(Value::as_str) {
                Some(name) => match self.prompts.get(name) {
                    Some(prompt) => prompt.render(params.get("arguments").cloned().unwrap_or(Value::Null)).await,
                    None => Err(format!("no prompt registered as '{name}'")),
                },
                None => Err("prompts/get missing params.name".to_string()),
            },
            "tools/list" => Ok(json!({"tools": self.tools.names()})),
            "resources/list" => Ok(json!({"resources": self.resources.names()})),
            "prompts/list" => Ok(json!({"prompts": self.prompts.names()})),
            other => Err(format!("unsupported method '{other}'")),
        };

        let payload = match result {
            Ok(value) => json!({"result": value}),
            Err(message) => json!({"error": {"message": message}}),
        };

        let response = EnvelopeBuilder::new(kinds::MCP_RESPONSE)
            .from(self.identity.clone())
            .to(envelope.from.clone())
            .correlates(envelope.id.clone())
            .payload(payload)
            .build();
        if let Ok(response) = response {
            let _ = self.send_raw(&response);
        }
    }

    async fn sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.outgoing.sweep_expired(|| CorrelationError::Timeout);
                    self.proposals.sweep_expired();
                }
                () = self.shutdown.notified() => return,
            }
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

async fn await_resolution(rx: oneshot::Receiver<Result<Value, CorrelationError>>) -> Result<Value, ParticipantError> {
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ParticipantError::Correlation(err)),
        Err(_) => Err(ParticipantError::Correlation(CorrelationError::Cancelled)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Arc<ParticipantRuntime> {
        let config = ConnectConfig::new("ws://localhost:9999/ws", "alice", "tok-alice");
        Arc::new(ParticipantRuntime::new(config))
    }

    #[tokio::test]
    async fn send_without_connection_is_not_connected() {
        let runtime = runtime();
        let builder = EnvelopeBuilder::new(kinds::CHAT).payload(json!({"text": "hi"}));
        let err = runtime.send(builder).await.unwrap_err();
        assert!(matches!(err, ParticipantError::NotConnected));
    }

    #[tokio::test]
    async fn send_is_denied_locally_without_matching_capability() {
        let runtime = runtime();
        let (tx, _rx) = mpsc::unbounded_channel();
        *runtime.outbound_tx.lock().unwrap() = Some(tx);
        let builder = EnvelopeBuilder::new(kinds::CHAT).payload(json!({"text": "hi"}));
        let err = runtime.send(builder).await.unwrap_err();
        assert!(matches!(err, ParticipantError::LocalCapabilityDenied(k) if k == kinds::CHAT));
    }

    #[tokio::test]
    async fn welcome_populates_capability_cache() {
        let runtime = runtime();
        let welcome = EnvelopeBuilder::new(kinds::SYSTEM_WELCOME)
            .from("gateway")
            .to("alice")
            .payload(json!({"identity": "alice", "capabilities": [{"kind": "chat"}]}))
            .build()
            .unwrap();
        let mut ready = None;
        runtime.handle_inbound(&welcome.to_wire_bytes().unwrap(), &mut ready).await;
        let caps = runtime.capabilities();
        assert_eq!(caps, vec![CapabilityPattern::kind_only("chat")]);
    }

    #[tokio::test]
    async fn grant_merges_capabilities_and_enqueues_ack() {
        let runtime = runtime();
        let (tx, mut rx) = mpsc::unbounded_channel();
        *runtime.outbound_tx.lock().unwrap() = Some(tx);

        let grant = EnvelopeBuilder::new(kinds::CAPABILITY_GRANT)
            .from("gateway")
            .to("alice")
            .payload(json!({"capabilities": [{"kind": "mcp/*"}]}))
            .build()
            .unwrap();
        let mut ready = None;
        runtime.handle_inbound(&grant.to_wire_bytes().unwrap(), &mut ready).await;

        assert_eq!(runtime.capabilities(), vec![CapabilityPattern::kind_only("mcp/*")]);
        let ack_message = rx.recv().await.unwrap();
        let Message::Text(text) = ack_message else { panic!("expected text frame") };
        let ack = Envelope::parse(text.as_bytes()).unwrap();
        assert_eq!(ack.kind, kinds::CAPABILITY_GRANT_ACK);
        assert_eq!(ack.correlation_id, vec![grant.id]);
    }

    #[tokio::test]
    async fn revoke_removes_matching_capability() {
        let runtime = runtime();
        *runtime.capabilities.lock().unwrap() = vec![
            CapabilityPattern::kind_only("chat"),
            CapabilityPattern::kind_only("mcp/*"),
        ];
        let revoke = EnvelopeBuilder::new(kinds::CAPABILITY_REVOKE)
            .from("gateway")
            .to("alice")
            .payload(json!({"capabilities": [{"kind": "mcp/*"}]}))
            .build()
            .unwrap();
        let mut ready = None;
        runtime.handle_inbound(&revoke.to_wire_bytes().unwrap(), &mut ready).await;
        assert_eq!(runtime.capabilities(), vec![CapabilityPattern::kind_only("chat")]);
    }

    #[tokio::test]
    async fn stream_lifecycle_tracks_sequence_and_closes() {
        let runtime = runtime();
        let handle = runtime.streams.open("s-1", Some("bob".to_string()));
        assert_eq!(handle.next_sequence(), 0);
        assert!(runtime.streams.get("s-1").is_some());
        runtime.streams.close("s-1");
        assert!(runtime.streams.get("s-1").is_none());
    }
}
