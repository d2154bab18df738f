// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection parameters for [`crate::ParticipantRuntime::connect`].

use std::time::Duration;

/// Parameters for connecting a participant runtime to a gateway.
#[derive(Clone, Debug)]
pub struct ConnectConfig {
    /// Gateway WebSocket URL, e.g. `"ws://localhost:8080/ws"`.
    pub gateway_url: String,
    /// This participant's identity, as configured on the gateway.
    pub identity: String,
    /// Bearer token presented during admission.
    pub token: String,
    /// How long to wait for `system/welcome` before failing the connect.
    pub handshake_timeout: Duration,
    /// Initial delay before the first reconnect attempt.
    pub reconnect_initial_backoff: Duration,
    /// Upper bound the exponential reconnect backoff is capped at.
    pub reconnect_max_backoff: Duration,
}

impl ConnectConfig {
    /// Construct connection parameters with the runtime's default timeouts
    /// and backoff schedule.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>, identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            identity: identity.into(),
            token: token.into(),
            handshake_timeout: Duration::from_secs(10),
            reconnect_initial_backoff: Duration::from_millis(250),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}
