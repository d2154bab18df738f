// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic bounded mailbox for a pending async operation, addressed by
//! envelope id and carrying a monotonic deadline so cleanup on disconnect
//! or cancellation is uniform across outgoing requests, proposals, and
//! stream handshakes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::CorrelationError;

struct Slot<T> {
    resolver: oneshot::Sender<Result<T, CorrelationError>>,
    deadline: Instant,
}

/// A table of pending awaiters keyed by correlation id (typically the
/// primary — first element — of an envelope's `correlation_id`, or the
/// outgoing request's own id).
pub struct PendingTable<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> PendingTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new pending entry with a deadline `timeout` from now.
    /// Returns a receiver that resolves when [`PendingTable::resolve`],
    /// [`PendingTable::fail`], or [`PendingTable::cancel`] is called with
    /// the same `id`, or when a sweep observes the deadline has passed.
    pub fn register(&self, id: impl Into<String>, timeout: Duration) -> oneshot::Receiver<Result<T, CorrelationError>> {
        let (tx, rx) = oneshot::channel();
        let slot = Slot {
            resolver: tx,
            deadline: Instant::now() + timeout,
        };
        self.slots.lock().expect("pending table mutex poisoned").insert(id.into(), slot);
        rx
    }

    /// Resolve a pending entry with a successful value. Returns `true` if
    /// an entry with `id` was found (and thus released).
    pub fn resolve(&self, id: &str, value: T) -> bool {
        let slot = self.slots.lock().expect("pending table mutex poisoned").remove(id);
        match slot {
            Some(slot) => slot.resolver.send(Ok(value)).is_ok(),
            None => false,
        }
    }

    /// Resolve a pending entry with an error. Returns `true` if an entry
    /// with `id` was found.
    pub fn fail(&self, id: &str, error: CorrelationError) -> bool {
        let slot = self.slots.lock().expect("pending table mutex poisoned").remove(id);
        match slot {
            Some(slot) => slot.resolver.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Cancel a pending entry, releasing its caller with
    /// [`CorrelationError::Cancelled`].
    pub fn cancel(&self, id: &str) -> bool {
        self.fail(id, CorrelationError::Cancelled)
    }

    /// Remove and fail every entry whose deadline has passed, using
    /// `on_expire` to produce the error for each. Returns the ids that were
    /// expired, for logging.
    pub fn sweep_expired(&self, on_expire: impl Fn() -> CorrelationError) -> Vec<String> {
        let now = Instant::now();
        let mut guard = self.slots.lock().expect("pending table mutex poisoned");
        let expired_ids: Vec<String> = guard
            .iter()
            .filter(|(_, slot)| slot.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired_ids {
            if let Some(slot) = guard.remove(id) {
                let _ = slot.resolver.send(Err(on_expire()));
            }
        }
        if !expired_ids.is_empty() {
            tracing::debug!(count = expired_ids.len(), "swept expired pending entries");
        }
        expired_ids
    }

    /// Remove and fail every currently pending entry, regardless of
    /// deadline, with `error`. Used when the thing serving these requests
    /// (a connection, a subprocess) has gone away entirely. Returns the ids
    /// that were failed, for logging.
    pub fn fail_all(&self, error: CorrelationError) -> Vec<String> {
        let mut guard = self.slots.lock().expect("pending table mutex poisoned");
        let ids: Vec<String> = guard.keys().cloned().collect();
        for id in &ids {
            if let Some(slot) = guard.remove(id) {
                let _ = slot.resolver.send(Err(error.clone()));
            }
        }
        ids
    }

    /// Number of entries currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().expect("pending table mutex poisoned").len()
    }

    /// Returns `true` if no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if an entry with `id` is currently pending.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.lock().expect("pending table mutex poisoned").contains_key(id)
    }
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
