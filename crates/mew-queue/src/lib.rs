// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Bounded per-recipient outbound envelope queue.
//!
//! Each participant session owns one [`OutboundQueue`]. The gateway's router
//! enqueues one copy of an admitted envelope per recipient; this module
//! implements the backpressure policy chosen when that queue is full.
//! System envelopes (`system/*`, `capability/*`) are treated as critical and
//! are never dropped, per the gateway's routing invariants.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mew_config::OverflowPolicy;
use mew_types::Envelope;
use tokio::sync::Notify;

/// How long [`OutboundQueue::enqueue`] waits for room to free up under
/// [`OverflowPolicy::BlockSender`] before giving up and reporting
/// [`EnqueueOutcome::Overflowed`] to the caller.
pub const BLOCK_SENDER_TIMEOUT: Duration = Duration::from_millis(200);

/// Returns `true` if `envelope.kind` is a `system/*` or `capability/*`
/// envelope, which the queue never drops or rejects regardless of policy.
#[must_use]
pub fn is_critical(envelope: &Envelope) -> bool {
    envelope.kind.starts_with("system/") || envelope.kind.starts_with("capability/")
}

/// Outcome of [`OutboundQueue::try_enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The envelope was accepted into the queue.
    Enqueued,
    /// The queue was full and the overflow policy is
    /// [`OverflowPolicy::CloseSlowRecipient`] or
    /// [`OverflowPolicy::DropOldestNonCritical`] found nothing droppable;
    /// the caller MUST close this recipient's session.
    Overflowed,
    /// The queue was already closed; the envelope was not accepted.
    Closed,
}

/// A bounded FIFO queue of envelopes awaiting delivery to one recipient.
pub struct OutboundQueue {
    inner: Mutex<VecDeque<Envelope>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
}

impl OutboundQueue {
    /// Create a new queue with the given bounded `capacity` and overflow
    /// `policy`.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Attempt to enqueue `envelope` without blocking.
    ///
    /// Critical envelopes (see [`is_critical`]) are always accepted as long
    /// as the queue is open, even past `capacity` — the gateway's invariant
    /// is that system and capability envelopes are never dropped.
    pub fn try_enqueue(&self, envelope: Envelope) -> EnqueueOutcome {
        if self.closed.load(Ordering::Acquire) {
            return EnqueueOutcome::Closed;
        }
        let critical = is_critical(&envelope);
        let mut guard = self.inner.lock().expect("outbound queue mutex poisoned");
        if guard.len() < self.capacity || critical {
            guard.push_back(envelope);
            drop(guard);
            self.notify.notify_one();
            return EnqueueOutcome::Enqueued;
        }

        match self.policy {
            OverflowPolicy::CloseSlowRecipient | OverflowPolicy::BlockSender => {
                EnqueueOutcome::Overflowed
            }
            OverflowPolicy::DropOldestNonCritical => {
                if let Some(idx) = guard.iter().position(|e| !is_critical(e)) {
                    guard.remove(idx);
                    guard.push_back(envelope);
                    drop(guard);
                    self.notify.notify_one();
                    EnqueueOutcome::Enqueued
                } else {
                    // Every queued entry is critical; nothing to drop.
                    EnqueueOutcome::Overflowed
                }
            }
        }
    }

    /// Attempt to enqueue `envelope`, applying [`OverflowPolicy::BlockSender`]'s
    /// backpressure: if the queue is full under that policy, wait up to
    /// [`BLOCK_SENDER_TIMEOUT`] for a consumer to drain an entry before
    /// retrying, falling back to [`EnqueueOutcome::Overflowed`] if the
    /// timeout elapses. Other policies behave exactly as
    /// [`OutboundQueue::try_enqueue`].
    pub async fn enqueue(&self, envelope: Envelope) -> EnqueueOutcome {
        loop {
            match self.try_enqueue(envelope.clone()) {
                EnqueueOutcome::Overflowed if self.policy == OverflowPolicy::BlockSender => {
                    match tokio::time::timeout(BLOCK_SENDER_TIMEOUT, self.notify.notified()).await {
                        Ok(()) => continue,
                        Err(_elapsed) => return EnqueueOutcome::Overflowed,
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// Pop the oldest envelope without blocking.
    pub fn try_dequeue(&self) -> Option<Envelope> {
        let popped = self.inner.lock().expect("outbound queue mutex poisoned").pop_front();
        if popped.is_some() {
            self.notify.notify_one();
        }
        popped
    }

    /// Wait for and pop the oldest envelope, or return `None` once the
    /// queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Envelope> {
        loop {
            if let Some(env) = self.try_dequeue() {
                return Some(env);
            }
            if self.closed.load(Ordering::Acquire) {
                return self.try_dequeue();
            }
            self.notify.notified().await;
        }
    }

    /// Mark the queue closed; pending items remain available to drain via
    /// [`OutboundQueue::dequeue`]/[`OutboundQueue::try_dequeue`], but no new
    /// enqueue will succeed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Returns `true` once [`OutboundQueue::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current number of queued envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("outbound queue mutex poisoned").len()
    }

    /// Returns `true` if the queue currently holds no envelopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_types::EnvelopeBuilder;
    use serde_json::json;

    fn chat(id: &str) -> Envelope {
        EnvelopeBuilder::new("chat")
            .from("speaker")
            .id(id)
            .payload(json!({"text": id}))
            .build()
            .unwrap()
    }

    fn system_error(id: &str) -> Envelope {
        EnvelopeBuilder::new("system/error").from("gateway").id(id).build().unwrap()
    }

    #[tokio::test]
    async fn enqueues_up_to_capacity_then_overflows_with_close_policy() {
        let queue = OutboundQueue::new(2, OverflowPolicy::CloseSlowRecipient);
        assert_eq!(queue.try_enqueue(chat("m1")), EnqueueOutcome::Enqueued);
        assert_eq!(queue.try_enqueue(chat("m2")), EnqueueOutcome::Enqueued);
        assert_eq!(queue.try_enqueue(chat("m3")), EnqueueOutcome::Overflowed);
    }

    #[tokio::test]
    async fn critical_envelopes_are_never_dropped() {
        let queue = OutboundQueue::new(1, OverflowPolicy::CloseSlowRecipient);
        assert_eq!(queue.try_enqueue(chat("m1")), EnqueueOutcome::Enqueued);
        assert_eq!(queue.try_enqueue(system_error("e1")), EnqueueOutcome::Enqueued);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn drop_oldest_non_critical_makes_room() {
        let queue = OutboundQueue::new(2, OverflowPolicy::DropOldestNonCritical);
        queue.try_enqueue(chat("m1"));
        queue.try_enqueue(chat("m2"));
        let outcome = queue.try_enqueue(chat("m3"));
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
        assert_eq!(queue.len(), 2);
        let first = queue.try_dequeue().unwrap();
        assert_eq!(first.id, "m2");
    }

    #[tokio::test]
    async fn block_sender_waits_for_room_then_succeeds() {
        let queue = std::sync::Arc::new(OutboundQueue::new(1, OverflowPolicy::BlockSender));
        assert_eq!(queue.try_enqueue(chat("m1")), EnqueueOutcome::Enqueued);

        let sender = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(chat("m2")).await })
        };

        // Give the blocked sender a moment to start waiting, then drain
        // the queue so it can make room.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.try_dequeue().unwrap().id, "m1");

        let outcome = sender.await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
        assert_eq!(queue.try_dequeue().unwrap().id, "m2");
    }

    #[tokio::test]
    async fn block_sender_gives_up_after_timeout() {
        let queue = OutboundQueue::new(1, OverflowPolicy::BlockSender);
        assert_eq!(queue.try_enqueue(chat("m1")), EnqueueOutcome::Enqueued);
        let outcome = queue.enqueue(chat("m2")).await;
        assert_eq!(outcome, EnqueueOutcome::Overflowed);
    }

    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let queue = OutboundQueue::new(10, OverflowPolicy::CloseSlowRecipient);
        queue.try_enqueue(chat("m1"));
        queue.try_enqueue(chat("m2"));
        assert_eq!(queue.dequeue().await.unwrap().id, "m1");
        assert_eq!(queue.dequeue().await.unwrap().id, "m2");
    }

    #[tokio::test]
    async fn closed_queue_rejects_new_enqueues_but_drains_pending() {
        let queue = OutboundQueue::new(10, OverflowPolicy::CloseSlowRecipient);
        queue.try_enqueue(chat("m1"));
        queue.close();
        assert_eq!(queue.try_enqueue(chat("m2")), EnqueueOutcome::Closed);
        assert_eq!(queue.dequeue().await.unwrap().id, "m1");
        assert_eq!(queue.dequeue().await, None);
    }
}
