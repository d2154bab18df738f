// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the participant runtime.

use mew_correlation::CorrelationError;
use mew_types::EnvelopeError;

/// Errors raised by [`crate::ParticipantRuntime`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    /// The WebSocket connection to the gateway failed or was refused.
    #[error("transport error: {0}")]
    Transport(String),
    /// The gateway closed the session or never admitted it.
    #[error("not connected to a gateway")]
    NotConnected,
    /// The gateway's admission handshake did not complete in time.
    #[error("handshake with gateway timed out")]
    HandshakeTimeout,
    /// A local fast-fail capability check rejected the outgoing envelope
    /// before it was ever sent to the gateway.
    #[error("local capability check denied kind '{0}'")]
    LocalCapabilityDenied(String),
    /// An outgoing request, proposal, or stream handshake did not resolve.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// An envelope could not be built or parsed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// The gateway reported a protocol-level error in response.
    #[error("gateway rejected request: {0}")]
    Remote(String),
}
