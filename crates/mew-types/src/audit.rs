// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit log entry schema: the append-only, newline-delimited record of
//! admitted and denied envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// The gateway's admission decision for a logged envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The envelope passed the capability matcher and was routed.
    Admitted,
    /// The envelope failed the capability matcher.
    Denied,
}

/// One line of the append-only audit log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// The envelope verbatim, as admitted or denied.
    pub envelope: Envelope,
    /// Gateway-assigned ingress timestamp (duplicated from the envelope for
    /// readers that do not want to parse it out).
    pub timestamp: DateTime<Utc>,
    /// Admission decision.
    pub decision: Decision,
    /// Present when `decision == Denied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditLogEntry {
    /// Build an entry for an admitted envelope.
    #[must_use]
    pub fn admitted(envelope: Envelope) -> Self {
        let timestamp = envelope.timestamp;
        Self {
            envelope,
            timestamp,
            decision: Decision::Admitted,
            reason: None,
        }
    }

    /// Build an entry for a denied envelope.
    #[must_use]
    pub fn denied(envelope: Envelope, reason: impl Into<String>) -> Self {
        let timestamp = envelope.timestamp;
        Self {
            envelope,
            timestamp,
            decision: Decision::Denied,
            reason: Some(reason.into()),
        }
    }

    /// Serialize to a single newline-delimited-JSON line (without the
    /// trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be represented as JSON.
    pub fn to_jsonl_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a single line of the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not valid JSON matching this shape.
    pub fn from_jsonl_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
