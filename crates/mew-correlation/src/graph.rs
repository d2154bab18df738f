// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory DAG mapping an envelope id to its direct predecessors, built
//! lazily as envelopes are observed. Enables proposers to trace how their
//! proposals were fulfilled and supports reasoning-chain filtering by
//! `context`.

use std::collections::HashMap;
use std::sync::Mutex;

use mew_types::Envelope;

/// A lazily built correlation DAG. Only the primary (first) element of
/// `correlation_id` is indexed as the parent edge, per this implementation's
/// resolution of the array-shape open question; the full array is not
/// discarded, just not used for graph edges beyond the first element.
#[derive(Default)]
pub struct CorrelationGraph {
    /// envelope id -> its primary parent, if any.
    parent: Mutex<HashMap<String, String>>,
}

impl CorrelationGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed envelope's correlation edge.
    pub fn record(&self, envelope: &Envelope) {
        if let Some(parent_id) = envelope.primary_correlation() {
            self.parent
                .lock()
                .expect("correlation graph mutex poisoned")
                .insert(envelope.id.clone(), parent_id.to_string());
        }
    }

    /// The direct primary parent of `id`, if recorded.
    #[must_use]
    pub fn parent_of(&self, id: &str) -> Option<String> {
        self.parent.lock().expect("correlation graph mutex poisoned").get(id).cloned()
    }

    /// Walk the primary-parent chain starting at `id`, returning the full
    /// ancestor path (not including `id` itself), root first is last.
    /// Stops at 64 hops to guard against an accidental cycle.
    #[must_use]
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = id.to_string();
        for _ in 0..64 {
            match self.parent_of(&current) {
                Some(parent) if !out.contains(&parent) => {
                    out.push(parent.clone());
                    current = parent;
                }
                _ => break,
            }
        }
        out
    }

    /// Returns `true` if `root_id` appears anywhere in `id`'s ancestor
    /// chain — used to test whether a response ultimately correlates back
    /// to a proposal.
    #[must_use]
    pub fn chain_includes(&self, id: &str, root_id: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == root_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_types::EnvelopeBuilder;

    fn env_with_correlation(id: &str, correlates: &str) -> Envelope {
        EnvelopeBuilder::new("mcp/response")
            .id(id)
            .from("fs")
            .correlates(correlates)
            .build()
            .unwrap()
    }

    #[test]
    fn traces_chain_across_three_hops() {
        let graph = CorrelationGraph::new();
        // proposal P -> request R -> response S
        graph.record(&env_with_correlation("R", "P"));
        graph.record(&env_with_correlation("S", "R"));
        assert!(graph.chain_includes("S", "P"));
        assert_eq!(graph.ancestors("S"), vec!["R".to_string(), "P".to_string()]);
    }

    #[test]
    fn unrelated_envelope_does_not_chain() {
        let graph = CorrelationGraph::new();
        graph.record(&env_with_correlation("R", "P"));
        assert!(!graph.chain_includes("R", "other"));
    }
}
