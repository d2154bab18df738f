// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Space configuration file loading, validation, and the typed shape the
//! gateway consumes at startup.
//!
//! The gateway reads this file once; runtime grants/revokes mutate an
//! in-memory copy of the resulting [`SpaceConfig`], never the file itself.

use std::collections::BTreeSet;
use std::path::Path;

use mew_capability::{PatternError, validate_pattern};
use mew_types::CapabilityPattern;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Errors that can occur while loading or validating a space configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid TOML.
    #[error("failed to parse space config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed (one or more problems).
    #[error("space config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A participant was declared with no capabilities at all.
    NoCapabilities {
        /// Participant identity.
        identity: String,
    },
    /// `audit_log_path` was not set; falls back to a default relative path.
    MissingAuditLogPath,
    /// `recipient_queue_capacity` is unusually large, which weakens the
    /// overflow-close backpressure guarantee in practice.
    LargeQueueCapacity {
        /// The configured capacity.
        capacity: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCapabilities { identity } => {
                write!(f, "participant '{identity}' has no capabilities; it can send nothing")
            }
            Self::MissingAuditLogPath => {
                write!(f, "audit_log_path not set; defaulting to './audit.log.jsonl'")
            }
            Self::LargeQueueCapacity { capacity } => {
                write!(f, "recipient_queue_capacity {capacity} is unusually large")
            }
        }
    }
}

/// Policy applied when a recipient's bounded outbound queue is full.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Close the slow recipient with `system/error(overflow)`. Default.
    #[default]
    CloseSlowRecipient,
    /// Drop the oldest non-critical queued envelope to make room.
    DropOldestNonCritical,
    /// Block the sender briefly, applying backpressure upstream: routing
    /// waits up to `mew_queue::BLOCK_SENDER_TIMEOUT` for the recipient's
    /// queue to drain before falling back to
    /// [`OverflowPolicy::CloseSlowRecipient`]'s behavior.
    BlockSender,
}

/// Policy applied when a second concurrent admission uses an identity that
/// already has an active session.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIdentityPolicy {
    /// Reject the new admission outright.
    #[default]
    Reject,
    /// Terminate the prior session with `system/error(displaced)` and admit
    /// the new one.
    Displace,
}

/// A single participant's declared identity, bearer token, and initial
/// capability set.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ParticipantConfig {
    /// Stable participant identity.
    pub identity: String,
    /// Bearer token presented at connection time.
    pub token: String,
    /// Initial capability patterns granted at admission.
    #[serde(default)]
    pub capabilities: Vec<CapabilityPattern>,
}

/// Top-level space configuration, consumed once at gateway startup.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SpaceConfig {
    /// The named scope within which envelopes are routed and audited.
    pub space_id: String,
    /// Address the WebSocket/HTTP transport binds to, e.g. `"0.0.0.0:8080"`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path to the append-only audit log file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<String>,
    /// Bounded capacity of each recipient's outbound queue.
    #[serde(default = "default_queue_capacity")]
    pub recipient_queue_capacity: usize,
    /// Policy applied on recipient outbound-queue overflow.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Policy applied on duplicate-identity admission.
    #[serde(default)]
    pub duplicate_identity_policy: DuplicateIdentityPolicy,
    /// Declared participants and their initial capabilities.
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
}

fn default_bind_address() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

const LARGE_QUEUE_CAPACITY_THRESHOLD: usize = 100_000;

impl SpaceConfig {
    /// Look up a participant's configuration by bearer token.
    #[must_use]
    pub fn participant_by_token(&self, token: &str) -> Option<&ParticipantConfig> {
        self.participants.iter().find(|p| p.token == token)
    }
}

/// Load a [`SpaceConfig`] from a TOML file on disk.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` cannot be read, or
/// [`ConfigError::ParseError`] if its contents are not valid TOML matching
/// the space configuration shape.
pub fn load_config(path: &Path) -> Result<SpaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content)
}

/// Parse a TOML string into a [`SpaceConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not valid TOML
/// matching the space configuration shape.
pub fn parse_toml(content: &str) -> Result<SpaceConfig, ConfigError> {
    toml::from_str::<SpaceConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Validate a parsed space configuration, returning advisory warnings.
///
/// Hard errors (empty space id, duplicate identities/tokens, malformed
/// capability patterns) come back as [`ConfigError::ValidationError`]; soft
/// issues come back as warnings.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if any hard validation rule is
/// violated.
pub fn validate_config(config: &SpaceConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.space_id.trim().is_empty() {
        errors.push("space_id must not be empty".into());
    }

    let mut seen_identities: BTreeSet<&str> = BTreeSet::new();
    let mut seen_tokens: BTreeSet<&str> = BTreeSet::new();
    for participant in &config.participants {
        if participant.identity.is_empty() {
            errors.push("participant identity must not be empty".into());
        } else if participant.identity.contains('_') {
            errors.push(format!(
                "participant identity '{}' must not contain underscores",
                participant.identity
            ));
        } else if !seen_identities.insert(participant.identity.as_str()) {
            errors.push(format!("duplicate participant identity '{}'", participant.identity));
        }

        if participant.token.is_empty() {
            errors.push(format!("participant '{}': token must not be empty", participant.identity));
        } else if !seen_tokens.insert(participant.token.as_str()) {
            errors.push(format!("duplicate bearer token for participant '{}'", participant.identity));
        }

        if participant.capabilities.is_empty() {
            warnings.push(ConfigWarning::NoCapabilities {
                identity: participant.identity.clone(),
            });
        }

        for pattern in &participant.capabilities {
            if let Err(PatternError::DoubleStarNotLast(kind)) = validate_pattern(pattern) {
                errors.push(format!(
                    "participant '{}': `**` must be the last segment of kind pattern {kind:?}",
                    participant.identity
                ));
            } else if let Err(PatternError::EmptyKind) = validate_pattern(pattern) {
                errors.push(format!(
                    "participant '{}': capability kind pattern must not be empty",
                    participant.identity
                ));
            }
        }
    }

    if config.recipient_queue_capacity == 0 {
        errors.push("recipient_queue_capacity must be greater than zero".into());
    } else if config.recipient_queue_capacity > LARGE_QUEUE_CAPACITY_THRESHOLD {
        warnings.push(ConfigWarning::LargeQueueCapacity {
            capacity: config.recipient_queue_capacity,
        });
    }

    if config.audit_log_path.is_none() {
        warnings.push(ConfigWarning::MissingAuditLogPath);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_toml() -> &'static str {
        r#"
            space_id = "demo"

            [[participants]]
            identity = "alice"
            token = "tok-alice"

            [[participants.capabilities]]
            kind = "chat"
        "#
    }

    #[test]
    fn parses_minimal_space_config() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        assert_eq!(cfg.space_id, "demo");
        assert_eq!(cfg.participants.len(), 1);
        assert_eq!(cfg.participants[0].capabilities.len(), 1);
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = parse_toml(r#"space_id = "demo""#).unwrap();
        assert_eq!(cfg.bind_address, "127.0.0.1:8765");
        assert_eq!(cfg.recipient_queue_capacity, 256);
        assert_eq!(cfg.overflow_policy, OverflowPolicy::CloseSlowRecipient);
    }

    #[test]
    fn validation_catches_empty_space_id() {
        let cfg = parse_toml(r#"space_id = """#).unwrap();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_underscore_identity() {
        let toml_str = r#"
            space_id = "demo"
            [[participants]]
            identity = "bad_name"
            token = "t"
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("underscores")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_duplicate_identity() {
        let toml_str = r#"
            space_id = "demo"
            [[participants]]
            identity = "alice"
            token = "t1"
            [[participants]]
            identity = "alice"
            token = "t2"
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("duplicate participant identity")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_duplicate_token() {
        let toml_str = r#"
            space_id = "demo"
            [[participants]]
            identity = "alice"
            token = "shared"
            [[participants]]
            identity = "bob"
            token = "shared"
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_double_star_not_last() {
        let toml_str = r#"
            space_id = "demo"
            [[participants]]
            identity = "alice"
            token = "t"
            [[participants.capabilities]]
            kind = "reasoning/**/thought"
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn no_capabilities_produces_warning_not_error() {
        let toml_str = r#"
            space_id = "demo"
            [[participants]]
            identity = "alice"
            token = "t"
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::NoCapabilities { .. })));
    }

    #[test]
    fn missing_audit_log_path_warns() {
        let cfg = parse_toml(r#"space_id = "demo""#).unwrap();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::MissingAuditLogPath));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Path::new("/nonexistent/space.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", minimal_toml()).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.space_id, "demo");
    }

    #[test]
    fn participant_lookup_by_token() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        assert!(cfg.participant_by_token("tok-alice").is_some());
        assert!(cfg.participant_by_token("nope").is_none());
    }
}
