// SPDX-License-Identifier: MIT OR Apache-2.0
//! Machine-readable error taxonomy shared across every `system/error`
//! payload and log field the gateway and participant runtime emit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An error-taxonomy bucket paired with a short reason slug, rendered as
/// `MEW-<category><number>` for inclusion in `system/error` payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Connection refused.
    TransportRefused,
    /// Unexpected transport close.
    TransportClosed,
    /// A frame could not be decoded.
    TransportMalformedFrame,
    /// Envelope failed structural validation.
    ProtocolMalformed,
    /// `protocol` named an unrecognized version.
    ProtocolUnsupportedVersion,
    /// `envelope.from` did not match the session identity.
    ProtocolIdentityMismatch,
    /// Capability matcher denied the envelope.
    AuthorizationCapabilityDenied,
    /// `to` named a participant the gateway displaced or does not know.
    RoutingUnknownRecipient,
    /// A recipient's outbound queue overflowed.
    ResourceOverflow,
    /// A correlated response did not arrive before its deadline.
    CorrelationTimeout,
    /// A proposal was never fulfilled before its deadline.
    CorrelationProposalUnfulfilled,
    /// A fulfillment was observed but its response never arrived.
    CorrelationFulfillmentTimeout,
    /// The remote side of a correlated exchange returned an error.
    CorrelationRemoteError,
    /// The bridge's subordinate process crashed.
    SubordinateCrashed,
    /// The subordinate's JSON-RPC handshake did not complete in time.
    SubordinateHandshakeTimeout,
    /// The subordinate returned a JSON-RPC error object.
    SubordinateJsonRpcError,
    /// A prior session with the same identity was displaced by a new admission.
    SessionDisplaced,
}

impl ErrorCode {
    /// Return the `MEW-<category><number>` machine-readable code string.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::TransportRefused => "MEW-T001",
            Self::TransportClosed => "MEW-T002",
            Self::TransportMalformedFrame => "MEW-T003",
            Self::ProtocolMalformed => "MEW-P001",
            Self::ProtocolUnsupportedVersion => "MEW-P002",
            Self::ProtocolIdentityMismatch => "MEW-P003",
            Self::AuthorizationCapabilityDenied => "MEW-A001",
            Self::RoutingUnknownRecipient => "MEW-R001",
            Self::ResourceOverflow => "MEW-O001",
            Self::CorrelationTimeout => "MEW-C001",
            Self::CorrelationProposalUnfulfilled => "MEW-C002",
            Self::CorrelationFulfillmentTimeout => "MEW-C003",
            Self::CorrelationRemoteError => "MEW-C004",
            Self::SubordinateCrashed => "MEW-S001",
            Self::SubordinateHandshakeTimeout => "MEW-S002",
            Self::SubordinateJsonRpcError => "MEW-S003",
            Self::SessionDisplaced => "MEW-P004",
        }
    }

    /// Short snake_case reason slug used as the `reason` field of a
    /// `system/error` payload (e.g. `"capability_denied"`, `"overflow"`).
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::TransportRefused => "refused",
            Self::TransportClosed => "closed",
            Self::TransportMalformedFrame => "malformed_frame",
            Self::ProtocolMalformed => "malformed",
            Self::ProtocolUnsupportedVersion => "unsupported_version",
            Self::ProtocolIdentityMismatch => "identity_mismatch",
            Self::AuthorizationCapabilityDenied => "capability_denied",
            Self::RoutingUnknownRecipient => "unknown_recipient",
            Self::ResourceOverflow => "overflow",
            Self::CorrelationTimeout => "timeout",
            Self::CorrelationProposalUnfulfilled => "proposal_unfulfilled",
            Self::CorrelationFulfillmentTimeout => "fulfillment_timeout",
            Self::CorrelationRemoteError => "remote_error",
            Self::SubordinateCrashed => "subordinate_crashed",
            Self::SubordinateHandshakeTimeout => "handshake_timeout",
            Self::SubordinateJsonRpcError => "subordinate_error",
            Self::SessionDisplaced => "displaced",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let all = [
            ErrorCode::TransportRefused,
            ErrorCode::TransportClosed,
            ErrorCode::TransportMalformedFrame,
            ErrorCode::ProtocolMalformed,
            ErrorCode::ProtocolUnsupportedVersion,
            ErrorCode::ProtocolIdentityMismatch,
            ErrorCode::AuthorizationCapabilityDenied,
            ErrorCode::RoutingUnknownRecipient,
            ErrorCode::ResourceOverflow,
            ErrorCode::CorrelationTimeout,
            ErrorCode::CorrelationProposalUnfulfilled,
            ErrorCode::CorrelationFulfillmentTimeout,
            ErrorCode::CorrelationRemoteError,
            ErrorCode::SubordinateCrashed,
            ErrorCode::SubordinateHandshakeTimeout,
            ErrorCode::SubordinateJsonRpcError,
            ErrorCode::SessionDisplaced,
        ];
        let mut codes: Vec<&str> = all.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn display_combines_code_and_reason() {
        assert_eq!(ErrorCode::ResourceOverflow.to_string(), "MEW-O001 (overflow)");
    }
}
