// SPDX-License-Identifier: MIT OR Apache-2.0
//! Segment-wise matching of a `kind` pattern against an envelope's `kind`.

/// Returns `true` if `pattern` matches `kind` under the hierarchical
/// slash-segment rules:
///
/// - A bare `*` pattern (no slashes at all) matches any kind at any depth —
///   this is the contractual reading of `{kind: "*"}` permitting "anything"
///   (see the capability-matcher literal examples table).
/// - Otherwise the pattern and kind are split on `/` and matched segment by
///   segment: a literal segment must equal exactly, `*` matches exactly one
///   segment, and `**` matches zero or more remaining segments — `**` must
///   be the last pattern segment.
#[must_use]
pub fn kind_matches(pattern: &str, kind: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let kind_segments: Vec<&str> = kind.split('/').collect();
    segments_match(&pattern_segments, &kind_segments)
}

fn segments_match(pattern: &[&str], kind: &[&str]) -> bool {
    match pattern.first() {
        None => kind.is_empty(),
        Some(&"**") => {
            // `**` must be the last pattern segment; it swallows everything
            // remaining in `kind` regardless of depth.
            pattern.len() == 1
        }
        Some(&"*") => {
            !kind.is_empty() && segments_match(&pattern[1..], &kind[1..])
        }
        Some(&literal) => {
            kind.first() == Some(&literal) && segments_match(&pattern[1..], &kind[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_star_matches_anything() {
        assert!(kind_matches("*", "chat"));
        assert!(kind_matches("*", "mcp/request"));
        assert!(kind_matches("*", "reasoning/start/deep"));
    }

    #[test]
    fn literal_matches_only_itself() {
        assert!(kind_matches("chat", "chat"));
        assert!(!kind_matches("chat", "chat/acknowledge"));
    }

    #[test]
    fn single_segment_wildcard_under_prefix() {
        assert!(kind_matches("mcp/*", "mcp/request"));
        assert!(kind_matches("mcp/*", "mcp/response"));
        assert!(!kind_matches("mcp/*", "mcp/request/streaming"));
        assert!(!kind_matches("mcp/*", "chat"));
    }

    #[test]
    fn double_star_matches_any_depth_under_prefix() {
        assert!(kind_matches("reasoning/**", "reasoning/start"));
        assert!(kind_matches("reasoning/**", "reasoning/thought/step"));
        assert!(kind_matches("reasoning/**", "reasoning"));
        assert!(!kind_matches("reasoning/**", "chat"));
    }

    #[test]
    fn double_star_matches_zero_remaining_segments() {
        assert!(kind_matches("mcp/request/**", "mcp/request"));
    }
}
