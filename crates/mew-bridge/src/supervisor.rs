// SPDX-License-Identifier: MIT OR Apache-2.0
//! Supervises an MCP server subprocess: runs its `initialize`/`initialized`
//! handshake, routes `call`s to outstanding JSON-RPC ids, and restarts the
//! process with capped exponential backoff if it crashes, failing every
//! outstanding call so callers can retry rather than hang forever.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mew_correlation::{CorrelationError, PendingTable};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::BridgeError;
use crate::jsonrpc::{InboundMessage, JsonRpcNotification, JsonRpcRequest};
use crate::process::McpServerProcess;
use crate::spec::McpServerSpec;

/// Default deadline a `call` waits under before giving up.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

enum Outbound {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

type CrashHook = dyn Fn(&BridgeError) + Send + Sync;

/// A supervised, auto-restarting connection to one MCP server subprocess.
pub struct McpBridge {
    spec: McpServerSpec,
    pending: PendingTable<Value>,
    next_id: AtomicU64,
    tools_cache: Mutex<Option<Value>>,
    resources_cache: Mutex<Option<Value>>,
    prompts_cache: Mutex<Option<Value>>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    on_crash: Mutex<Option<Arc<CrashHook>>>,
    shutdown: Notify,
    stopping: AtomicBool,
}

impl McpBridge {
    fn new(spec: McpServerSpec) -> Self {
        Self {
            spec,
            pending: PendingTable::new(),
            next_id: AtomicU64::new(0),
            tools_cache: Mutex::new(None),
            resources_cache: Mutex::new(None),
            prompts_cache: Mutex::new(None),
            outbound_tx: Mutex::new(None),
            on_crash: Mutex::new(None),
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Spawn the subprocess and run its `initialize`/`initialized`
    /// handshake, blocking until it completes. The returned bridge keeps
    /// restarting crashed subprocesses for the rest of its lifetime, until
    /// [`McpBridge::shutdown`] is called or the restart limit is exceeded.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Spawn`] if the subprocess cannot be started,
    /// or any handshake-phase error the subprocess reports.
    pub async fn start(spec: McpServerSpec) -> Result<Arc<Self>, BridgeError> {
        let bridge = Arc::new(Self::new(spec));
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(bridge.clone().supervise(Some(ready_tx)));
        tokio::spawn(bridge.clone().sweep_loop());
        ready_rx.await.map_err(|_| BridgeError::Exited(None))?
    }

    /// Register a callback invoked whenever the subprocess crashes (exits
    /// while being supervised, successfully or not).
    pub fn on_crash(&self, hook: impl Fn(&BridgeError) + Send + Sync + 'static) {
        *self.on_crash.lock().expect("crash hook mutex poisoned") = Some(Arc::new(hook));
    }

    /// Stop supervising and kill the subprocess.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Call a JSON-RPC method on the subprocess and await its response.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::JsonRpc`] if the subprocess answers with an
    /// error object, [`BridgeError::Timeout`] if no response arrives within
    /// `timeout`, or [`BridgeError::Exited`] if the subprocess crashes while
    /// the call is outstanding.
    pub async fn call(&self, method: impl Into<String>, params: Value, timeout: Duration) -> Result<Value, BridgeError> {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let rx = self.pending.register(id, timeout);
        self.send(Outbound::Request(request))?;
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CorrelationError::Timeout)) => Err(BridgeError::Timeout),
            Ok(Err(CorrelationError::RemoteError(message))) => Err(BridgeError::Protocol(message)),
            Ok(Err(other)) => Err(BridgeError::Protocol(other.to_string())),
            Err(_) => Err(BridgeError::Exited(None)),
        }
    }

    /// List the subprocess's tools, caching the result.
    ///
    /// # Errors
    ///
    /// See [`McpBridge::call`].
    pub async fn discover_tools(&self) -> Result<Value, BridgeError> {
        self.discover("tools/list", &self.tools_cache).await
    }

    /// List the subprocess's resources, caching the result.
    ///
    /// # Errors
    ///
    /// See [`McpBridge::call`].
    pub async fn discover_resources(&self) -> Result<Value, BridgeError> {
        self.discover("resources/list", &self.resources_cache).await
    }

    /// List the subprocess's prompts, caching the result.
    ///
    /// # Errors
    ///
    /// See [`McpBridge::call`].
    pub async fn discover_prompts(&self) -> Result<Value, BridgeError> {
        self.discover("prompts/list", &self.prompts_cache).await
    }

    async fn discover(&self, method: &str, cache: &Mutex<Option<Value>>) -> Result<Value, BridgeError> {
        if let Some(cached) = cache.lock().expect("discovery cache mutex poisoned").clone() {
            return Ok(cached);
        }
        let result = self.call(method, json!({}), DEFAULT_CALL_TIMEOUT).await?;
        *cache.lock().expect("discovery cache mutex poisoned") = Some(result.clone());
        Ok(result)
    }

    fn send(&self, message: Outbound) -> Result<(), BridgeError> {
        self.outbound_tx
            .lock()
            .expect("outbound sender mutex poisoned")
            .as_ref()
            .ok_or(BridgeError::Exited(None))?
            .send(message)
            .map_err(|_| BridgeError::Exited(None))
    }

    async fn supervise(self: Arc<Self>, mut ready_tx: Option<oneshot::Sender<Result<Arc<Self>, BridgeError>>>) {
        let mut backoff = self.spec.restart_initial_backoff;
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }

            let outcome = self.run_once(&mut ready_tx).await;
            *self.outbound_tx.lock().expect("outbound sender mutex poisoned") = None;

            match outcome {
                Ok(()) => return,
                Err(err) => {
                    consecutive_failures += 1;
                    tracing::warn!(error = %err, attempt = consecutive_failures, "mcp server subprocess exited");
                    self.pending.fail_all(CorrelationError::RemoteError(err.to_string()));
                    if let Some(hook) = self.on_crash.lock().expect("crash hook mutex poisoned").clone() {
                        hook(&err);
                    }
                    if consecutive_failures >= self.spec.max_consecutive_failures {
                        let limit_err = BridgeError::RestartLimitExceeded;
                        tracing::error!("mcp server exceeded its restart limit, giving up");
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Err(limit_err));
                        }
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
            backoff = (backoff * 2).min(self.spec.restart_max_backoff);
        }
    }

    /// Spawn and run one subprocess instance to completion. Returns `Ok(())`
    /// on a clean, requested shutdown, or `Err` describing why it exited.
    async fn run_once(self: &Arc<Self>, ready_tx: &mut Option<oneshot::Sender<Result<Arc<Self>, BridgeError>>>) -> Result<(), BridgeError> {
        let mut process = McpServerProcess::spawn(&self.spec).await?;

        if let Err(err) = self.handshake(&mut process).await {
            process.kill().await;
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(Err(BridgeError::Protocol(err.to_string())));
            }
            return Err(err);
        }

        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(Ok(self.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        *self.outbound_tx.lock().expect("outbound sender mutex poisoned") = Some(tx);

        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(Outbound::Request(request)) => {
                            if let Err(err) = process.send_request(&request).await {
                                process.kill().await;
                                return Err(err);
                            }
                        }
                        Some(Outbound::Notification(notification)) => {
                            if let Err(err) = process.send_notification(&notification).await {
                                process.kill().await;
                                return Err(err);
                            }
                        }
                        None => {}
                    }
                }
                incoming = process.recv() => {
                    match incoming {
                        Ok(Some(InboundMessage::Response { id, result, error })) => {
                            self.resolve(&id, result, error);
                        }
                        Ok(Some(InboundMessage::Inbound { method, .. })) => {
                            tracing::debug!(%method, "ignoring unsolicited message from mcp server");
                        }
                        Ok(None) => {
                            let code = process.try_exit_code().flatten();
                            process.kill().await;
                            return Err(BridgeError::Exited(code));
                        }
                        Err(err) => {
                            process.kill().await;
                            return Err(err);
                        }
                    }
                }
                () = self.shutdown.notified() => {
                    process.kill().await;
                    return Ok(());
                }
            }
        }
    }

    async fn handshake(&self, process: &mut McpServerProcess) -> Result<(), BridgeError> {
        let init_id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = JsonRpcRequest::new(
            init_id.clone(),
            "initialize",
            json!({"protocolVersion": "2025-06-18", "capabilities": {}}),
        );
        process.send_request(&request).await?;

        loop {
            match process.recv().await? {
                Some(InboundMessage::Response { id, error, .. }) if id.as_str() == Some(init_id.as_str()) => {
                    if let Some(error) = error {
                        return Err(BridgeError::JsonRpc {
                            code: error.code,
                            message: error.message,
                        });
                    }
                    break;
                }
                Some(_) => continue,
                None => return Err(BridgeError::Exited(None)),
            }
        }

        process
            .send_notification(&JsonRpcNotification::new("notifications/initialized", json!({})))
            .await
    }

    fn resolve(&self, id: &Value, result: Option<Value>, error: Option<crate::jsonrpc::JsonRpcError>) {
        let Some(id) = id.as_str() else { return };
        match error {
            Some(error) => {
                self.pending.fail(
                    id,
                    CorrelationError::RemoteError(format!("{}: {}", error.code, error.message)),
                );
            }
            None => {
                self.pending.resolve(id, result.unwrap_or(Value::Null));
            }
        }
    }

    async fn sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pending.sweep_expired(|| CorrelationError::Timeout);
                }
                () = self.shutdown.notified() => return,
            }
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}
