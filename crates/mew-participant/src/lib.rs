// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Reusable participant runtime: connects to a gateway over WebSocket,
//! reconnects with backoff, enforces a local fast-fail capability check
//! before sending, and auto-dispatches incoming `mcp/request`s against
//! registered tools, resources, and prompts.

/// Connection parameters.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Tool/resource/prompt handler registries.
pub mod registry;
/// The connected runtime itself.
pub mod runtime;
/// Per-stream sequence tracking.
pub mod stream;

pub use config::ConnectConfig;
pub use error::ParticipantError;
pub use registry::{PromptProvider, PromptRegistry, ResourceProvider, ResourceRegistry, ToolExecutor, ToolRegistry};
pub use runtime::ParticipantRuntime;
pub use stream::{StreamHandle, StreamTable};
