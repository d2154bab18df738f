// SPDX-License-Identifier: MIT OR Apache-2.0
//! Participant session state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a participant session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Authenticated but not yet welcomed.
    Joining,
    /// Welcomed and eligible to send/receive.
    Active,
    /// Suspended by an explicit `participant/pause` control envelope.
    Paused,
    /// Disconnected; flushing pending outbound envelopes within a grace period.
    Draining,
    /// Transport released; terminal state.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Record of a single session state transition, kept for diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionTransition {
    /// State before the transition.
    pub from: SessionState,
    /// State after the transition.
    pub to: SessionState,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Errors raised by [`SessionLifecycle`] when a transition is invalid.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionLifecycleError {
    /// The requested transition is not allowed by the state machine.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested target state.
        to: SessionState,
    },
}

/// Tracks and enforces valid session state transitions.
///
/// Transitions follow:
///
/// ```text
/// joining ──welcome──► active ──pause──► paused ──resume──► active
///                       │                    │
///                       └──disconnect──► draining ──drain complete──► closed
/// ```
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
    history: Vec<SessionTransition>,
}

impl SessionLifecycle {
    /// Create a new lifecycle tracker starting in [`SessionState::Joining`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Joining,
            history: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if transitioning to `to` is valid from the current state.
    #[must_use]
    pub fn can_transition(&self, to: SessionState) -> bool {
        matches!(
            (self.state, to),
            (SessionState::Joining, SessionState::Active)
                | (SessionState::Active, SessionState::Paused)
                | (SessionState::Paused, SessionState::Active)
                | (SessionState::Active, SessionState::Draining)
                | (SessionState::Paused, SessionState::Draining)
                | (SessionState::Joining, SessionState::Draining)
                | (SessionState::Draining, SessionState::Closed)
        )
    }

    /// Attempt a transition, recording it in the history on success.
    ///
    /// # Errors
    ///
    /// Returns [`SessionLifecycleError::InvalidTransition`] if the state
    /// machine does not permit moving from the current state to `to`.
    pub fn transition(
        &mut self,
        to: SessionState,
        reason: Option<String>,
    ) -> Result<(), SessionLifecycleError> {
        if !self.can_transition(to) {
            return Err(SessionLifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.history.push(SessionTransition {
            from: self.state,
            to,
            reason,
        });
        self.state = to;
        Ok(())
    }

    /// Full transition history.
    #[must_use]
    pub fn history(&self) -> &[SessionTransition] {
        &self.history
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_to_active_to_paused_to_active() {
        let mut lc = SessionLifecycle::new();
        lc.transition(SessionState::Active, Some("welcome".into())).unwrap();
        lc.transition(SessionState::Paused, None).unwrap();
        lc.transition(SessionState::Active, None).unwrap();
        assert_eq!(lc.state(), SessionState::Active);
        assert_eq!(lc.history().len(), 3);
    }

    #[test]
    fn active_to_draining_to_closed() {
        let mut lc = SessionLifecycle::new();
        lc.transition(SessionState::Active, None).unwrap();
        lc.transition(SessionState::Draining, Some("disconnect".into()))
            .unwrap();
        lc.transition(SessionState::Closed, None).unwrap();
        assert_eq!(lc.state(), SessionState::Closed);
    }

    #[test]
    fn rejects_closed_to_active() {
        let mut lc = SessionLifecycle::new();
        lc.transition(SessionState::Active, None).unwrap();
        lc.transition(SessionState::Draining, None).unwrap();
        lc.transition(SessionState::Closed, None).unwrap();
        let err = lc.transition(SessionState::Active, None).unwrap_err();
        assert!(matches!(err, SessionLifecycleError::InvalidTransition { .. }));
    }
}
