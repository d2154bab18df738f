// SPDX-License-Identifier: MIT OR Apache-2.0
//! Partial-template matching of a capability pattern's `payload` fragment
//! against an envelope's payload.

use globset::GlobBuilder;
use serde_json::Value;

/// Returns `true` if `template` matches `payload` under the partial-template
/// rules: every field present in `template` must be present in `payload`
/// with a matching value; extra fields in `payload` are ignored.
#[must_use]
pub fn payload_matches(template: &Value, payload: &Value) -> bool {
    match (template, payload) {
        (Value::Object(tmpl_map), Value::Object(payload_map)) => {
            tmpl_map.iter().all(|(key, tmpl_value)| {
                payload_map
                    .get(key)
                    .is_some_and(|actual| payload_matches(tmpl_value, actual))
            })
        }
        (Value::Array(tmpl_items), Value::Array(payload_items)) => {
            tmpl_items.len() <= payload_items.len()
                && tmpl_items
                    .iter()
                    .zip(payload_items.iter())
                    .all(|(t, p)| payload_matches(t, p))
        }
        (Value::String(tmpl_str), Value::String(actual_str)) => {
            scalar_string_matches(tmpl_str, actual_str)
        }
        (Value::String(tmpl_str), _) if tmpl_str == "*" => true,
        (tmpl, actual) => tmpl == actual,
    }
}

fn scalar_string_matches(template: &str, actual: &str) -> bool {
    if template == "*" {
        return true;
    }
    if !template.contains('*') {
        return template == actual;
    }
    match GlobBuilder::new(template).literal_separator(false).build() {
        Ok(glob) => glob.compile_matcher().is_match(actual),
        Err(_) => template == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_template_fields_missing_fails() {
        let tmpl = json!({"method": "tools/call", "params": {"name": "write_file"}});
        let payload = json!({"method": "tools/call"});
        assert!(!payload_matches(&tmpl, &payload));
    }

    #[test]
    fn extra_payload_fields_are_ignored() {
        let tmpl = json!({"method": "tools/call"});
        let payload = json!({"method": "tools/call", "id": 7, "jsonrpc": "2.0"});
        assert!(payload_matches(&tmpl, &payload));
    }

    #[test]
    fn nested_object_matches_recursively() {
        let tmpl = json!({"method": "tools/call", "params": {"name": "read_*"}});
        let payload = json!({"method": "tools/call", "params": {"name": "read_file", "arguments": {}}});
        assert!(payload_matches(&tmpl, &payload));
    }

    #[test]
    fn glob_scalar_string_prefix() {
        assert!(scalar_string_matches("read_*", "read_file"));
        assert!(!scalar_string_matches("read_*", "write_file"));
    }

    #[test]
    fn array_template_may_be_shorter() {
        let tmpl = json!(["a", "b"]);
        let payload = json!(["a", "b", "c"]);
        assert!(payload_matches(&tmpl, &payload));
        let payload_too_short = json!(["a"]);
        assert!(!payload_matches(&tmpl, &payload_too_short));
    }

    #[test]
    fn wildcard_scalar_matches_any_value() {
        let tmpl = json!({"name": "*"});
        assert!(payload_matches(&tmpl, &json!({"name": "read_file"})));
        assert!(payload_matches(&tmpl, &json!({"name": 42})));
    }
}
