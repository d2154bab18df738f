// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical envelope schema: the single wire unit routed by the gateway.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Current protocol version tag accepted by the gateway.
pub const PROTOCOL_VERSION: &str = "mew/v0.4";

/// Immediate predecessor version the gateway still accepts for compatibility.
pub const PROTOCOL_VERSION_COMPAT: &str = "mew/v0.3";

/// Returns `true` if `version` is the current protocol version or its
/// accepted predecessor.
#[must_use]
pub fn is_compatible_version(version: &str) -> bool {
    version == PROTOCOL_VERSION || version == PROTOCOL_VERSION_COMPAT
}

/// Generate a collision-resistant envelope identifier.
///
/// # Examples
///
/// ```
/// let id = mew_types::new_envelope_id();
/// assert!(id.starts_with("env-"));
/// ```
#[must_use]
pub fn new_envelope_id() -> String {
    format!("env-{}", Uuid::new_v4())
}

/// The unit of communication routed by the gateway.
///
/// Unknown top-level fields are preserved in [`Envelope::extra`] and
/// re-serialized verbatim rather than dropped, so forward-compatible
/// extensions survive a round trip through the gateway.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Protocol version tag, e.g. `"mew/v0.4"`.
    #[serde(rename = "protocol")]
    pub protocol_version: String,
    /// Unique identifier, generated by the sender.
    pub id: String,
    /// Gateway-assigned ingress timestamp. Senders may supply a hint; the
    /// gateway always overrides it on admission.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Sender's participant identity.
    pub from: String,
    /// Ordered recipient identities. Empty means broadcast.
    #[serde(default)]
    pub to: Vec<String>,
    /// Hierarchical slash-separated tag, e.g. `"mcp/request"`.
    pub kind: String,
    /// Envelope ids this envelope refers to, in order.
    #[serde(default)]
    pub correlation_id: Vec<String>,
    /// Optional logical grouping tag (a parent envelope id or topic string).
    #[serde(default)]
    pub context: Option<String>,
    /// Structured, kind-dependent payload.
    #[serde(default)]
    pub payload: Value,
    /// Unknown top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Envelope {
    /// Returns `true` if `to` is empty (broadcast addressing).
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }

    /// Returns the primary correlation target (`correlation_id[0]`), the
    /// array's first element, per the implementation's choice to treat it
    /// as the sole lookup key for internal registries.
    #[must_use]
    pub fn primary_correlation(&self) -> Option<&str> {
        self.correlation_id.first().map(String::as_str)
    }

    /// Split `kind` into its slash-separated segments.
    #[must_use]
    pub fn kind_segments(&self) -> Vec<&str> {
        self.kind.split('/').collect()
    }
}

/// Errors raised while parsing or validating an [`Envelope`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The bytes were not valid JSON or did not match the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// `protocol` named a version the gateway does not accept.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    /// A mandatory field was absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// A field was present but failed validation.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl Envelope {
    /// Parse and validate an envelope from its wire JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if the bytes are not valid JSON
    /// matching the envelope shape, [`EnvelopeError::UnsupportedVersion`] if
    /// `protocol` names an unrecognized version, or
    /// [`EnvelopeError::InvalidField`] if `id`, `from`, or `kind` is empty.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Validate field-level invariants on an already-deserialized envelope.
    ///
    /// # Errors
    ///
    /// See [`Envelope::parse`].
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if !is_compatible_version(&self.protocol_version) {
            return Err(EnvelopeError::UnsupportedVersion(
                self.protocol_version.clone(),
            ));
        }
        if self.id.is_empty() {
            return Err(EnvelopeError::InvalidField {
                field: "id",
                reason: "must be non-empty".into(),
            });
        }
        if self.from.is_empty() {
            return Err(EnvelopeError::InvalidField {
                field: "from",
                reason: "must be non-empty".into(),
            });
        }
        if self.kind.is_empty() {
            return Err(EnvelopeError::InvalidField {
                field: "kind",
                reason: "must be non-empty".into(),
            });
        }
        Ok(())
    }

    /// Serialize to the canonical wire JSON form. Field ordering is not
    /// guaranteed to be stable.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or `extra` map contains values that
    /// cannot be represented as JSON (practically unreachable for
    /// `serde_json::Value`-backed fields).
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope(id={}, from={}, kind={}, to={:?})",
            self.id, self.from, self.kind, self.to
        )
    }
}

/// Builder for constructing envelopes with sensible defaults, mirroring the
/// fluent builder idiom used elsewhere in the gateway's type layer.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    from: Option<String>,
    to: Vec<String>,
    kind: Option<String>,
    correlation_id: Vec<String>,
    context: Option<String>,
    payload: Value,
}

impl EnvelopeBuilder {
    /// Start building an envelope of the given `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            payload: Value::Null,
            ..Default::default()
        }
    }

    /// Set the sender identity.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set an explicit envelope id, overriding auto-generation.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an explicit timestamp hint (the gateway overrides this on ingress).
    #[must_use]
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Append a recipient. Leaving the list empty means broadcast.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Set the full recipient list.
    #[must_use]
    pub fn to_all(mut self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Append a correlation target.
    #[must_use]
    pub fn correlates(mut self, id: impl Into<String>) -> Self {
        self.correlation_id.push(id.into());
        self
    }

    /// Set the logical grouping context.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Finalize the envelope, filling `id`/`timestamp` defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingField`] if `from` was never set.
    pub fn build(self) -> Result<Envelope, EnvelopeError> {
        let from = self.from.ok_or(EnvelopeError::MissingField("from"))?;
        let kind = self.kind.ok_or(EnvelopeError::MissingField("kind"))?;
        Ok(Envelope {
            protocol_version: PROTOCOL_VERSION.to_string(),
            id: self.id.unwrap_or_else(new_envelope_id),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            from,
            to: self.to,
            kind,
            correlation_id: self.correlation_id,
            context: self.context,
            payload: self.payload,
            extra: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_when_to_is_empty() {
        let env = EnvelopeBuilder::new("chat")
            .from("alice")
            .payload(json!({"text": "hi"}))
            .build()
            .unwrap();
        assert!(env.is_broadcast());
    }

    #[test]
    fn directed_when_to_is_non_empty() {
        let env = EnvelopeBuilder::new("chat")
            .from("alice")
            .to("bob")
            .build()
            .unwrap();
        assert!(!env.is_broadcast());
        assert_eq!(env.to, vec!["bob".to_string()]);
    }

    #[test]
    fn primary_correlation_is_first_element() {
        let env = EnvelopeBuilder::new("mcp/response")
            .from("fs")
            .correlates("req-1")
            .correlates("req-2")
            .build()
            .unwrap();
        assert_eq!(env.primary_correlation(), Some("req-1"));
    }

    #[test]
    fn rejects_empty_kind_segments_parse() {
        let bytes = br#"{"protocol":"mew/v0.4","id":"e1","ts":"2025-01-01T00:00:00Z","from":"a","kind":""}"#;
        let err = Envelope::parse(bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidField { field: "kind", .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let bytes = br#"{"protocol":"mew/v9.9","id":"e1","ts":"2025-01-01T00:00:00Z","from":"a","kind":"chat"}"#;
        let err = Envelope::parse(bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnsupportedVersion(_)));
    }

    #[test]
    fn accepts_compat_version() {
        let bytes = br#"{"protocol":"mew/v0.3","id":"e1","ts":"2025-01-01T00:00:00Z","from":"a","kind":"chat"}"#;
        Envelope::parse(bytes).unwrap();
    }

    #[test]
    fn unknown_fields_round_trip() {
        let bytes = br#"{"protocol":"mew/v0.4","id":"e1","ts":"2025-01-01T00:00:00Z","from":"a","kind":"chat","future_field":true}"#;
        let env = Envelope::parse(bytes).unwrap();
        assert_eq!(env.extra.get("future_field"), Some(&json!(true)));
        let out = env.to_wire_bytes().unwrap();
        let re_parsed = Envelope::parse(&out).unwrap();
        assert_eq!(re_parsed.extra.get("future_field"), Some(&json!(true)));
    }
}
