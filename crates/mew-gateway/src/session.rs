// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-identity session records and the registry the gateway core consults
//! on every admission and ingest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mew_queue::OutboundQueue;
use mew_types::{CapabilityPattern, SessionLifecycle, SessionState};

/// An admitted participant's live state: its capability set, outbound
/// queue, and lifecycle tracker. Shared via `Arc` between the router and
/// the connection task that drains the outbound queue onto the transport.
pub struct SessionRecord {
    /// Stable participant identity (`envelope.from`).
    pub identity: String,
    /// Current capability set, mutable via `capability/grant` and
    /// `capability/revoke`.
    pub capabilities: Mutex<Vec<CapabilityPattern>>,
    /// Per-recipient bounded outbound queue.
    pub outbound: Arc<OutboundQueue>,
    /// Session lifecycle state machine.
    pub lifecycle: Mutex<SessionLifecycle>,
}

impl SessionRecord {
    /// Create a new session record in the `joining` state.
    #[must_use]
    pub fn new(identity: impl Into<String>, capabilities: Vec<CapabilityPattern>, outbound: Arc<OutboundQueue>) -> Self {
        Self {
            identity: identity.into(),
            capabilities: Mutex::new(capabilities),
            outbound,
            lifecycle: Mutex::new(SessionLifecycle::new()),
        }
    }

    /// Snapshot the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().expect("session lifecycle mutex poisoned").state()
    }

    /// Snapshot the current capability set.
    #[must_use]
    pub fn capability_snapshot(&self) -> Vec<CapabilityPattern> {
        self.capabilities.lock().expect("session capability mutex poisoned").clone()
    }
}

/// Registry of currently known sessions, keyed by participant identity.
///
/// One active session per identity at a time; admission of a duplicate
/// identity is resolved by the space's [`mew_config::DuplicateIdentityPolicy`]
/// before a new entry replaces the old one here.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `identity`, returning the
    /// previously registered session (if any) so the caller can close it.
    pub fn insert(&self, identity: &str, session: Arc<SessionRecord>) -> Option<Arc<SessionRecord>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .insert(identity.to_string(), session)
    }

    /// Look up a session by identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<Arc<SessionRecord>> {
        self.sessions.lock().expect("session registry mutex poisoned").get(identity).cloned()
    }

    /// Remove a session by identity, returning it if present.
    pub fn remove(&self, identity: &str) -> Option<Arc<SessionRecord>> {
        self.sessions.lock().expect("session registry mutex poisoned").remove(identity)
    }

    /// Every session currently in the `active` state, excluding `except`.
    #[must_use]
    pub fn active_except(&self, except: &str) -> Vec<Arc<SessionRecord>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .values()
            .filter(|s| s.identity != except && s.state() == SessionState::Active)
            .cloned()
            .collect()
    }

    /// All sessions currently in the `active` state.
    #[must_use]
    pub fn all_active(&self) -> Vec<Arc<SessionRecord>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .values()
            .filter(|s| s.state() == SessionState::Active)
            .cloned()
            .collect()
    }

    /// Number of sessions currently registered, regardless of state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry mutex poisoned").len()
    }

    /// Returns `true` if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_config::OverflowPolicy;

    fn session(identity: &str) -> Arc<SessionRecord> {
        Arc::new(SessionRecord::new(
            identity,
            vec![],
            Arc::new(OutboundQueue::new(8, OverflowPolicy::CloseSlowRecipient)),
        ))
    }

    #[test]
    fn insert_and_get_round_trip() {
        let registry = SessionRegistry::new();
        registry.insert("alice", session("alice"));
        assert!(registry.get("alice").is_some());
        assert!(registry.get("bob").is_none());
    }

    #[test]
    fn insert_returns_prior_session_on_displacement() {
        let registry = SessionRegistry::new();
        let first = session("alice");
        registry.insert("alice", first.clone());
        let second = session("alice");
        let displaced = registry.insert("alice", second);
        assert!(Arc::ptr_eq(&displaced.unwrap(), &first));
    }

    #[test]
    fn active_except_excludes_sender_and_inactive() {
        let registry = SessionRegistry::new();
        let alice = session("alice");
        alice
            .lifecycle
            .lock()
            .unwrap()
            .transition(SessionState::Active, None)
            .unwrap();
        let bob = session("bob");
        registry.insert("alice", alice);
        registry.insert("bob", bob);
        let active = registry.active_except("alice");
        assert_eq!(active.len(), 0);
    }
}
