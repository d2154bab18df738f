// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway-level error taxonomy.

use mew_types::ErrorCode;

/// Errors the gateway can raise while admitting participants or routing
/// envelopes. Each variant carries the [`ErrorCode`] reported on the wire
/// inside the corresponding `system/error` envelope.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The bearer token does not match any configured participant.
    #[error("unauthorized: token not recognized")]
    Unauthorized,
    /// Another active session already holds this identity and the space's
    /// duplicate-identity policy rejects the new admission.
    #[error("identity '{0}' already has an active session")]
    DuplicateIdentity(String),
    /// The space has transitioned to a fatal error state (e.g. audit-log
    /// I/O failure) and is no longer admitting participants or envelopes.
    #[error("space is closed")]
    SpaceClosed,
    /// `envelope.from` did not match the session's bound identity.
    #[error("identity mismatch: envelope.from does not match session identity")]
    IdentityMismatch,
    /// The envelope failed structural validation.
    #[error(transparent)]
    Malformed(#[from] mew_types::EnvelopeError),
    /// The target session named in a control operation does not exist.
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    /// Persisting to the audit log failed; the space must halt ingestion.
    #[error("audit log write failed: {0}")]
    AuditIoFailure(String),
}

impl GatewayError {
    /// The machine-readable error code reported to clients.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized => ErrorCode::TransportRefused,
            Self::DuplicateIdentity(_) => ErrorCode::SessionDisplaced,
            Self::SpaceClosed => ErrorCode::TransportClosed,
            Self::IdentityMismatch => ErrorCode::ProtocolIdentityMismatch,
            Self::Malformed(_) => ErrorCode::ProtocolMalformed,
            Self::UnknownSession(_) => ErrorCode::RoutingUnknownRecipient,
            Self::AuditIoFailure(_) => ErrorCode::ResourceOverflow,
        }
    }
}
