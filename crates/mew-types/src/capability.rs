// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability pattern data model. Matching logic lives in `mew-capability`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pattern authorizing a sender to emit envelopes matching it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityPattern {
    /// Glob over `/`-separated `kind` segments (`*` one segment, `**` any depth).
    pub kind: String,
    /// Optional partial template matched against the envelope payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CapabilityPattern {
    /// Construct a pattern matching only on `kind`, with no payload template.
    #[must_use]
    pub fn kind_only(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Construct a pattern matching `kind` and a payload template.
    #[must_use]
    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }

    /// The unconditional wildcard pattern `{kind: "*"}`, which the matcher
    /// treats as matching any kind at any depth (see `mew-capability` for
    /// the exact rule).
    #[must_use]
    pub fn any_kind() -> Self {
        Self::kind_only("*")
    }
}

/// A named set of capability patterns assigned to a participant.
pub type CapabilitySet = Vec<CapabilityPattern>;
