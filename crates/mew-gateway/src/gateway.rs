// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway core: admits participants, enforces capabilities on every
//! envelope, routes to recipients, and appends the audit log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use mew_config::{DuplicateIdentityPolicy, SpaceConfig};
use mew_queue::{EnqueueOutcome, OutboundQueue};
use mew_types::{
    AuditLogEntry, CapabilityPattern, Envelope, EnvelopeBuilder, ErrorCode, SessionState, kinds,
    new_envelope_id,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::error::GatewayError;
use crate::session::{SessionRecord, SessionRegistry};

/// Outcome of a successful [`Gateway::ingest`] call, describing what the
/// caller (the connection task) should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The envelope was routed; no further action needed from the caller.
    Delivered,
    /// The envelope was rejected; `reason` names the [`ErrorCode`] reason
    /// slug, and a directed `system/error` has already been queued on the
    /// sender's own outbound queue.
    Denied {
        /// Snake_case reason slug, e.g. `"capability_denied"`.
        reason: &'static str,
    },
}

/// Owns one space: its configuration, session registry, and audit log.
pub struct Gateway {
    config: SpaceConfig,
    sessions: SessionRegistry,
    audit: AuditLog,
    /// Set once an unrecoverable fault (audit I/O failure) occurs. No
    /// further admissions or ingests are accepted once `true`.
    fatal: AtomicBool,
}

impl Gateway {
    /// Construct a gateway for `config`, opening its audit log.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the audit log cannot be opened.
    pub async fn new(config: SpaceConfig) -> std::io::Result<Self> {
        let audit_path = config
            .audit_log_path
            .clone()
            .unwrap_or_else(|| "./audit.log.jsonl".to_string());
        let audit = AuditLog::open(audit_path).await?;
        Ok(Self {
            config,
            sessions: SessionRegistry::new(),
            audit,
            fatal: AtomicBool::new(false),
        })
    }

    /// The space's static configuration.
    #[must_use]
    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// `true` once the space has halted due to a fatal fault (audit I/O
    /// failure).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Admit a new session for the identity resolved from `token`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SpaceClosed`] if the space has faulted,
    /// [`GatewayError::Unauthorized`] if `token` does not resolve to a
    /// configured participant, or [`GatewayError::DuplicateIdentity`] if
    /// the identity already has an active session and the space's
    /// duplicate-identity policy is [`DuplicateIdentityPolicy::Reject`].
    pub async fn admit(&self, token: &str) -> Result<Arc<SessionRecord>, GatewayError> {
        if self.is_fatal() {
            return Err(GatewayError::SpaceClosed);
        }
        let participant = self
            .config
            .participant_by_token(token)
            .ok_or(GatewayError::Unauthorized)?;
        let identity = participant.identity.clone();

        if let Some(existing) = self.sessions.get(&identity) {
            if existing.state() != SessionState::Closed {
                match self.config.duplicate_identity_policy {
                    DuplicateIdentityPolicy::Reject => {
                        return Err(GatewayError::DuplicateIdentity(identity));
                    }
                    DuplicateIdentityPolicy::Displace => {
                        self.displace(&existing).await;
                    }
                }
            }
        }

        let outbound = Arc::new(OutboundQueue::new(
            self.config.recipient_queue_capacity,
            self.config.overflow_policy,
        ));
        let session = Arc::new(SessionRecord::new(
            identity.clone(),
            participant.capabilities.clone(),
            outbound,
        ));
        session
            .lifecycle
            .lock()
            .expect("session lifecycle mutex poisoned")
            .transition(SessionState::Active, Some("welcome".into()))
            .expect("joining -> active is always valid");
        self.sessions.insert(&identity, session.clone());

        self.send_welcome(&session);
        self.broadcast_presence(&identity, "join");
        info!(identity = %identity, "session admitted");
        Ok(session)
    }

    async fn displace(&self, existing: &Arc<SessionRecord>) {
        let error = self.system_error_for(
            vec![existing.identity.clone()],
            ErrorCode::SessionDisplaced,
            None,
        );
        existing.outbound.try_enqueue(error);
        let mut lifecycle = existing.lifecycle.lock().expect("session lifecycle mutex poisoned");
        if lifecycle.state() != SessionState::Draining && lifecycle.state() != SessionState::Closed {
            let _ = lifecycle.transition(SessionState::Draining, Some("displaced".into()));
        }
        let _ = lifecycle.transition(SessionState::Closed, Some("displaced".into()));
        existing.outbound.close();
    }

    fn send_welcome(&self, session: &SessionRecord) {
        let capabilities = session.capability_snapshot();
        let welcome = EnvelopeBuilder::new(kinds::SYSTEM_WELCOME)
            .from("gateway")
            .to(&session.identity)
            .payload(json!({ "identity": session.identity, "capabilities": capabilities }))
            .build()
            .expect("welcome envelope is always well-formed");
        session.outbound.try_enqueue(welcome);
    }

    fn broadcast_presence(&self, identity: &str, event: &str) {
        for peer in self.sessions.active_except(identity) {
            let presence = EnvelopeBuilder::new(kinds::SYSTEM_PRESENCE)
                .from("gateway")
                .to(&peer.identity)
                .payload(json!({ "identity": identity, "event": event }))
                .build()
                .expect("presence envelope is always well-formed");
            peer.outbound.try_enqueue(presence);
        }
    }

    fn system_error_for(&self, to: Vec<String>, code: ErrorCode, detail: Option<String>) -> Envelope {
        EnvelopeBuilder::new(kinds::SYSTEM_ERROR)
            .from("gateway")
            .to_all(to)
            .payload(json!({ "code": code.code(), "reason": code.reason(), "detail": detail }))
            .build()
            .expect("system/error envelope is always well-formed")
    }

    /// Ingest an envelope already authenticated as coming from `session`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SpaceClosed`] if the space has faulted,
    /// [`GatewayError::IdentityMismatch`] if `envelope.from` does not match
    /// `session.identity`, or [`GatewayError::AuditIoFailure`] if the audit
    /// log write fails — in which case the space transitions to its fatal
    /// state as a side effect.
    pub async fn ingest(
        &self,
        session: &Arc<SessionRecord>,
        mut envelope: Envelope,
    ) -> Result<IngestOutcome, GatewayError> {
        if self.is_fatal() {
            return Err(GatewayError::SpaceClosed);
        }
        if envelope.from != session.identity {
            return Err(GatewayError::IdentityMismatch);
        }

        if envelope.id.is_empty() {
            envelope.id = new_envelope_id();
        }
        envelope.timestamp = Utc::now();

        let capabilities = session.capability_snapshot();
        if !mew_capability::permits(&capabilities, &envelope) {
            let reason = ErrorCode::AuthorizationCapabilityDenied;
            self.audit_or_fault(AuditLogEntry::denied(envelope.clone(), reason.reason()))
                .await?;
            let error = self.system_error_for(
                vec![session.identity.clone()],
                reason,
                Some(format!("kind '{}' not permitted", envelope.kind)),
            );
            session.outbound.try_enqueue(error);
            return Ok(IngestOutcome::Denied { reason: reason.reason() });
        }

        let recipients = self.resolve_recipients(session, &envelope);
        for recipient in recipients {
            // `enqueue` applies `OverflowPolicy::BlockSender`'s bounded wait for
            // recipients whose queue is configured with it; every other policy
            // behaves exactly like the non-blocking `try_enqueue` it wraps.
            match recipient.outbound.enqueue(envelope.clone()).await {
                EnqueueOutcome::Enqueued => {}
                EnqueueOutcome::Overflowed => self.close_for_overflow(&recipient).await,
                EnqueueOutcome::Closed => {}
            }
        }

        self.audit_or_fault(AuditLogEntry::admitted(envelope.clone())).await?;
        self.apply_capability_side_effects(&envelope);

        Ok(IngestOutcome::Delivered)
    }

    fn resolve_recipients(&self, sender: &Arc<SessionRecord>, envelope: &Envelope) -> Vec<Arc<SessionRecord>> {
        if envelope.is_broadcast() {
            return self.sessions.active_except(&sender.identity);
        }
        let mut resolved = Vec::with_capacity(envelope.to.len());
        for target in &envelope.to {
            match self.sessions.get(target) {
                Some(session) if session.state() == SessionState::Active => resolved.push(session),
                _ => warn!(recipient = %target, envelope_id = %envelope.id, "dropping delivery to unknown or inactive recipient"),
            }
        }
        resolved
    }

    async fn close_for_overflow(&self, recipient: &Arc<SessionRecord>) {
        let error = self.system_error_for(vec![recipient.identity.clone()], ErrorCode::ResourceOverflow, None);
        recipient.outbound.try_enqueue(error);
        {
            let mut lifecycle = recipient.lifecycle.lock().expect("session lifecycle mutex poisoned");
            if lifecycle.can_transition(SessionState::Draining) {
                let _ = lifecycle.transition(SessionState::Draining, Some("overflow".into()));
            }
            let _ = lifecycle.transition(SessionState::Closed, Some("overflow".into()));
        }
        recipient.outbound.close();
        warn!(identity = %recipient.identity, "closed slow recipient on outbound queue overflow");
    }

    async fn audit_or_fault(&self, entry: AuditLogEntry) -> Result<(), GatewayError> {
        if let Err(err) = self.audit.append(&entry).await {
            self.fatal.store(true, Ordering::Release);
            return Err(GatewayError::AuditIoFailure(err.to_string()));
        }
        Ok(())
    }

    fn apply_capability_side_effects(&self, envelope: &Envelope) {
        #[derive(Deserialize)]
        struct GrantPayload {
            identity: String,
            capabilities: Vec<CapabilityPattern>,
        }

        let Ok(payload) = serde_json::from_value::<GrantPayload>(envelope.payload.clone()) else {
            return;
        };
        let Some(target) = self.sessions.get(&payload.identity) else {
            return;
        };

        match envelope.kind.as_str() {
            kinds::CAPABILITY_GRANT => {
                let mut caps = target.capabilities.lock().expect("session capability mutex poisoned");
                caps.extend(payload.capabilities);
                drop(caps);
                self.send_welcome(&target);
            }
            kinds::CAPABILITY_REVOKE => {
                let mut caps = target.capabilities.lock().expect("session capability mutex poisoned");
                caps.retain(|c| !payload.capabilities.contains(c));
                drop(caps);
                self.send_welcome(&target);
            }
            _ => {}
        }
    }

    /// Close a session: transitions it to `draining` then `closed`,
    /// broadcasting `system/presence(leave)` and releasing its outbound
    /// queue. The caller is responsible for tearing down the transport.
    pub fn close(&self, identity: &str, reason: Option<String>) {
        let Some(session) = self.sessions.remove(identity) else {
            return;
        };
        {
            let mut lifecycle = session.lifecycle.lock().expect("session lifecycle mutex poisoned");
            if lifecycle.can_transition(SessionState::Draining) {
                let _ = lifecycle.transition(SessionState::Draining, reason.clone());
            }
            if lifecycle.can_transition(SessionState::Closed) {
                let _ = lifecycle.transition(SessionState::Closed, reason);
            }
        }
        session.outbound.close();
        self.broadcast_presence(identity, "leave");
        info!(identity = %identity, "session closed");
    }

    /// Access the session registry, e.g. for diagnostics endpoints.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}
