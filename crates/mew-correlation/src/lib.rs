// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request/response correlation, proposal-fulfillment tracking, and
//! reasoning-chain bookkeeping for a participant runtime.
//!
//! Three primitives compose to cover the correlation surface:
//!
//! - [`pending::PendingTable`]: a generic bounded mailbox per outstanding
//!   id, used directly for plain `mcp/request` → `mcp/response` waits and
//!   for stream open handshakes.
//! - [`graph::CorrelationGraph`]: a lazily built DAG of envelope id to its
//!   primary correlating parent, used to answer "did this response
//!   ultimately trace back to that proposal/request".
//! - [`ProposalTracker`]: composes both to implement the two-phase
//!   proposal lifecycle (await a fulfiller, then await that fulfiller's
//!   response).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod graph;
pub mod pending;
pub mod proposal;

pub use graph::CorrelationGraph;
pub use pending::PendingTable;
pub use proposal::ProposalTracker;

/// Errors that can resolve a pending correlation await.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// No response arrived before the registered deadline.
    #[error("correlation timed out waiting for a response")]
    Timeout,
    /// The awaiting side was torn down (session closed, runtime shutdown)
    /// before a response arrived.
    #[error("correlation cancelled before a response arrived")]
    Cancelled,
    /// A proposal saw no fulfiller emit a correlated `mcp/request` before
    /// its first-phase deadline.
    #[error("proposal was not picked up by a fulfiller in time")]
    ProposalUnfulfilled,
    /// A fulfiller's request was observed but no correlated `mcp/response`
    /// arrived before its second-phase deadline.
    #[error("fulfiller's request was never answered in time")]
    FulfillmentTimeout,
    /// The remote side reported an error in place of a successful result.
    #[error("remote error: {0}")]
    RemoteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_carry_distinct_messages() {
        let messages: Vec<String> = [
            CorrelationError::Timeout,
            CorrelationError::Cancelled,
            CorrelationError::ProposalUnfulfilled,
            CorrelationError::FulfillmentTimeout,
            CorrelationError::RemoteError("boom".into()),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        let unique: std::collections::BTreeSet<_> = messages.iter().collect();
        assert_eq!(unique.len(), messages.len());
    }
}
