// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Pure capability-pattern matcher: decides whether a given envelope is
//! permitted for a given sender's capability set.
//!
//! # Examples
//!
//! ```
//! use mew_capability::permits;
//! use mew_types::{CapabilityPattern, EnvelopeBuilder};
//!
//! let caps = vec![CapabilityPattern::kind_only("mcp/*")];
//! let env = EnvelopeBuilder::new("mcp/request").from("agent").build().unwrap();
//! assert!(permits(&caps, &env));
//! ```

mod kind_match;
mod payload_match;

pub use kind_match::kind_matches;
pub use payload_match::payload_matches;

use mew_types::{CapabilityPattern, Envelope};

/// Returns `true` iff *some* pattern in `capabilities` matches `envelope`.
///
/// An empty capability list permits nothing. Matching is side-effect-free
/// and deterministic; cost is `O(#capabilities * depth(payload))`.
#[must_use]
pub fn permits(capabilities: &[CapabilityPattern], envelope: &Envelope) -> bool {
    capabilities.iter().any(|pattern| pattern_matches(pattern, envelope))
}

/// Returns the first pattern (in list order) permitting `envelope`, if any.
/// Exposed for diagnostics/logging; the boolean result of [`permits`] does
/// not depend on ordering.
#[must_use]
pub fn first_matching<'a>(
    capabilities: &'a [CapabilityPattern],
    envelope: &Envelope,
) -> Option<&'a CapabilityPattern> {
    capabilities.iter().find(|pattern| pattern_matches(pattern, envelope))
}

fn pattern_matches(pattern: &CapabilityPattern, envelope: &Envelope) -> bool {
    if !kind_matches(&pattern.kind, &envelope.kind) {
        return false;
    }
    match &pattern.payload {
        None => true,
        Some(template) => payload_matches(template, &envelope.payload),
    }
}

/// Errors raised when validating a capability pattern before it is admitted
/// into a space configuration (as opposed to matching, which never fails).
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// A `**` segment appeared somewhere other than last.
    #[error("`**` must be the last segment of kind pattern {0:?}")]
    DoubleStarNotLast(String),
    /// The pattern's `kind` field was empty.
    #[error("kind pattern must not be empty")]
    EmptyKind,
}

/// Validate a capability pattern's structural well-formedness (not whether
/// it matches anything in particular).
///
/// # Errors
///
/// Returns [`PatternError::EmptyKind`] if `kind` is empty, or
/// [`PatternError::DoubleStarNotLast`] if a `**` segment is not the final
/// one.
pub fn validate_pattern(pattern: &CapabilityPattern) -> Result<(), PatternError> {
    if pattern.kind.is_empty() {
        return Err(PatternError::EmptyKind);
    }
    if pattern.kind == "*" {
        return Ok(());
    }
    let segments: Vec<&str> = pattern.kind.split('/').collect();
    for (i, seg) in segments.iter().enumerate() {
        if *seg == "**" && i != segments.len() - 1 {
            return Err(PatternError::DoubleStarNotLast(pattern.kind.clone()));
        }
    }
    Ok(())
}
