// SPDX-License-Identifier: MIT OR Apache-2.0
//! Proposal-then-fulfill orchestration (§4.6): lets a proposer await the
//! eventual response to an `mcp/proposal` by observing ordinary broadcast
//! traffic, without bespoke plumbing in every participant.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mew_types::Envelope;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::graph::CorrelationGraph;
use crate::pending::PendingTable;
use crate::CorrelationError;

enum Phase {
    /// Waiting to observe a fulfiller's `mcp/request` correlated to the proposal.
    AwaitingFulfillment { deadline: Instant },
    /// A fulfiller's request was observed; waiting for its response.
    AwaitingResponse { request_id: String, deadline: Instant },
}

/// Tracks in-flight proposals and resolves each proposer's await by tracing
/// `response.correlation_id → request → request.correlation_id → proposal`
/// across observed broadcast traffic.
pub struct ProposalTracker {
    graph: CorrelationGraph,
    pending: PendingTable<Value>,
    phase: Mutex<HashMap<String, Phase>>,
}

impl ProposalTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: CorrelationGraph::new(),
            pending: PendingTable::new(),
            phase: Mutex::new(HashMap::new()),
        }
    }

    /// Register a newly issued proposal. Returns a receiver that resolves
    /// with the fulfilling response's payload, or with
    /// [`CorrelationError::ProposalUnfulfilled`] /
    /// [`CorrelationError::FulfillmentTimeout`] on the respective deadline.
    pub fn propose(
        &self,
        proposal_id: impl Into<String>,
        unfulfilled_timeout: Duration,
    ) -> oneshot::Receiver<Result<Value, CorrelationError>> {
        let proposal_id = proposal_id.into();
        let rx = self.pending.register(proposal_id.clone(), unfulfilled_timeout);
        self.phase.lock().expect("proposal tracker mutex poisoned").insert(
            proposal_id,
            Phase::AwaitingFulfillment {
                deadline: Instant::now() + unfulfilled_timeout,
            },
        );
        rx
    }

    /// Feed every envelope the participant observes (addressed or
    /// broadcast) through the tracker. Advances any proposal from
    /// "awaiting fulfillment" to "awaiting response" on a matching
    /// `mcp/request`, and resolves the proposer's await on a matching
    /// `mcp/response`.
    pub fn observe_envelope(&self, envelope: &Envelope, fulfillment_timeout: Duration) {
        self.graph.record(envelope);

        match envelope.kind.as_str() {
            "mcp/request" => self.observe_request(envelope, fulfillment_timeout),
            "mcp/response" => self.observe_response(envelope),
            _ => {}
        }
    }

    fn observe_request(&self, envelope: &Envelope, fulfillment_timeout: Duration) {
        let Some(proposal_id) = envelope.primary_correlation() else {
            return;
        };
        let mut phases = self.phase.lock().expect("proposal tracker mutex poisoned");
        if let Some(Phase::AwaitingFulfillment { .. }) = phases.get(proposal_id) {
            phases.insert(
                proposal_id.to_string(),
                Phase::AwaitingResponse {
                    request_id: envelope.id.clone(),
                    deadline: Instant::now() + fulfillment_timeout,
                },
            );
        }
    }

    fn observe_response(&self, envelope: &Envelope) {
        let Some(request_id) = envelope.primary_correlation() else {
            return;
        };
        let mut phases = self.phase.lock().expect("proposal tracker mutex poisoned");
        let resolved_proposal_id = phases.iter().find_map(|(proposal_id, phase)| match phase {
            Phase::AwaitingResponse { request_id: r, .. } if r == request_id => {
                Some(proposal_id.clone())
            }
            _ => None,
        });
        if let Some(proposal_id) = resolved_proposal_id {
            // First response to close the chain wins; remove the phase so
            // subsequent fulfillments/responses for the same proposal are
            // observed (graph.record already ran) but ignored here.
            phases.remove(&proposal_id);
            drop(phases);
            self.pending.resolve(&proposal_id, envelope.payload.clone());
        }
    }

    /// Sweep proposals whose current phase deadline has passed, failing
    /// each with the phase-appropriate [`CorrelationError`].
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut phases = self.phase.lock().expect("proposal tracker mutex poisoned");
        let expired: Vec<(String, CorrelationError)> = phases
            .iter()
            .filter_map(|(id, phase)| {
                let (deadline, error) = match phase {
                    Phase::AwaitingFulfillment { deadline } => {
                        (*deadline, CorrelationError::ProposalUnfulfilled)
                    }
                    Phase::AwaitingResponse { deadline, .. } => {
                        (*deadline, CorrelationError::FulfillmentTimeout)
                    }
                };
                (deadline <= now).then(|| (id.clone(), error))
            })
            .collect();
        for (id, _) in &expired {
            phases.remove(id);
        }
        drop(phases);
        for (id, error) in &expired {
            self.pending.fail(id, error.clone());
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Returns `true` if `proposal_id` is still awaiting resolution.
    #[must_use]
    pub fn is_pending(&self, proposal_id: &str) -> bool {
        self.pending.contains(proposal_id)
    }

    /// Access the underlying correlation graph, e.g. for audit tooling.
    #[must_use]
    pub fn graph(&self) -> &CorrelationGraph {
        &self.graph
    }
}

impl Default for ProposalTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_types::EnvelopeBuilder;
    use serde_json::json;

    fn request(id: &str, correlates: &str) -> Envelope {
        EnvelopeBuilder::new("mcp/request")
            .id(id)
            .from("human")
            .correlates(correlates)
            .payload(json!({"method": "tools/call"}))
            .build()
            .unwrap()
    }

    fn response(id: &str, correlates: &str, payload: Value) -> Envelope {
        EnvelopeBuilder::new("mcp/response")
            .id(id)
            .from("fs")
            .correlates(correlates)
            .payload(payload)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn full_proposal_fulfillment_round_trip() {
        let tracker = ProposalTracker::new();
        let rx = tracker.propose("P", Duration::from_secs(5));

        tracker.observe_envelope(&request("R", "P"), Duration::from_secs(5));
        assert!(tracker.is_pending("P"));

        tracker.observe_envelope(&response("S", "R", json!({"ok": true})), Duration::from_secs(5));

        let resolved = rx.await.unwrap().unwrap();
        assert_eq!(resolved, json!({"ok": true}));
        assert!(!tracker.is_pending("P"));
        assert!(tracker.graph().chain_includes("S", "P"));
    }

    #[tokio::test]
    async fn second_response_is_ignored_after_first_resolves() {
        let tracker = ProposalTracker::new();
        let rx = tracker.propose("P", Duration::from_secs(5));
        tracker.observe_envelope(&request("R", "P"), Duration::from_secs(5));
        tracker.observe_envelope(&response("S1", "R", json!({"winner": 1})), Duration::from_secs(5));
        // A second, racing fulfiller's response for the same request id.
        tracker.observe_envelope(&response("S2", "R", json!({"winner": 2})), Duration::from_secs(5));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"winner": 1}));
    }

    #[tokio::test]
    async fn unfulfilled_proposal_times_out() {
        let tracker = ProposalTracker::new();
        let rx = tracker.propose("P", Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let expired = tracker.sweep_expired();
        assert_eq!(expired, vec!["P".to_string()]);
        assert!(matches!(
            rx.await.unwrap(),
            Err(CorrelationError::ProposalUnfulfilled)
        ));
    }

    #[tokio::test]
    async fn fulfilled_but_unanswered_request_times_out_as_fulfillment_timeout() {
        let tracker = ProposalTracker::new();
        let rx = tracker.propose("P", Duration::from_secs(5));
        tracker.observe_envelope(&request("R", "P"), Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let expired = tracker.sweep_expired();
        assert_eq!(expired, vec!["P".to_string()]);
        assert!(matches!(
            rx.await.unwrap(),
            Err(CorrelationError::FulfillmentTimeout)
        ));
    }
}
