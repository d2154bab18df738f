// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Canonical envelope schema, identifiers, session state machine, audit log
//! entry shape, and error taxonomy shared by every other crate in the MEW
//! workspace gateway.

/// Audit log entry schema.
pub mod audit;
/// Capability pattern data model.
pub mod capability;
/// Machine-readable error taxonomy.
pub mod error_code;
/// The envelope type and its (de)serialization.
pub mod envelope;
/// Participant session lifecycle state machine.
pub mod session;

pub use audit::{AuditLogEntry, Decision};
pub use capability::{CapabilityPattern, CapabilitySet};
pub use envelope::{
    Envelope, EnvelopeBuilder, EnvelopeError, is_compatible_version, new_envelope_id,
    PROTOCOL_VERSION, PROTOCOL_VERSION_COMPAT,
};
pub use error_code::ErrorCode;
pub use session::{SessionLifecycle, SessionLifecycleError, SessionState, SessionTransition};

/// Well-known system and capability envelope kinds.
pub mod kinds {
    /// Directed to a newly admitted session; carries its assigned capabilities.
    pub const SYSTEM_WELCOME: &str = "system/welcome";
    /// Broadcast on join/leave.
    pub const SYSTEM_PRESENCE: &str = "system/presence";
    /// Directed error report.
    pub const SYSTEM_ERROR: &str = "system/error";
    /// Grant additional capabilities to a participant.
    pub const CAPABILITY_GRANT: &str = "capability/grant";
    /// Acknowledge a received grant.
    pub const CAPABILITY_GRANT_ACK: &str = "capability/grant-ack";
    /// Revoke capabilities from a participant.
    pub const CAPABILITY_REVOKE: &str = "capability/revoke";
    /// Direct JSON-RPC-shaped request.
    pub const MCP_REQUEST: &str = "mcp/request";
    /// Proposed JSON-RPC-shaped request awaiting a fulfiller.
    pub const MCP_PROPOSAL: &str = "mcp/proposal";
    /// Response to an `mcp/request`.
    pub const MCP_RESPONSE: &str = "mcp/response";
    /// Request to open a byte/chunk stream.
    pub const STREAM_REQUEST: &str = "stream/request";
    /// Acknowledges a stream request with an assigned stream id.
    pub const STREAM_OPEN: &str = "stream/open";
    /// A chunk of stream data.
    pub const STREAM_DATA: &str = "stream/data";
    /// Terminates a stream.
    pub const STREAM_CLOSE: &str = "stream/close";
    /// Begins a reasoning context.
    pub const REASONING_START: &str = "reasoning/start";
    /// An intermediate reasoning step.
    pub const REASONING_THOUGHT: &str = "reasoning/thought";
    /// Terminates a reasoning context.
    pub const REASONING_CONCLUSION: &str = "reasoning/conclusion";
    /// Requests cancellation of an in-flight reasoning context.
    pub const REASONING_CANCEL: &str = "reasoning/cancel";
    /// Suspend a session.
    pub const PARTICIPANT_PAUSE: &str = "participant/pause";
    /// Resume a suspended session.
    pub const PARTICIPANT_RESUME: &str = "participant/resume";
    /// Request graceful shutdown of a participant.
    pub const PARTICIPANT_SHUTDOWN: &str = "participant/shutdown";
    /// Request a participant restart itself.
    pub const PARTICIPANT_RESTART: &str = "participant/restart";
    /// Request a participant clear transient state.
    pub const PARTICIPANT_CLEAR: &str = "participant/clear";
    /// Request a participant forget cached state.
    pub const PARTICIPANT_FORGET: &str = "participant/forget";
    /// Plain chat message.
    pub const CHAT: &str = "chat";
    /// Acknowledges a chat message.
    pub const CHAT_ACKNOWLEDGE: &str = "chat/acknowledge";
}
