// SPDX-License-Identifier: MIT OR Apache-2.0
//! Snapshot tests for the wire envelope JSON shape and the audit-log JSONL
//! shape, pinned against a fully deterministic envelope so the serialized
//! form never depends on a generated id or the current time.

use chrono::{DateTime, Utc};
use mew_types::{AuditLogEntry, Envelope, EnvelopeBuilder};
use serde_json::json;

fn fixed_envelope() -> Envelope {
    let ts: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
    EnvelopeBuilder::new("chat")
        .id("env-00000000-0000-4000-8000-000000000001")
        .timestamp(ts)
        .from("alice")
        .to_all(["bob"])
        .correlates("env-00000000-0000-4000-8000-000000000000")
        .context("thread-1")
        .payload(json!({"text": "hello"}))
        .build()
        .unwrap()
}

#[test]
fn envelope_wire_shape() {
    let envelope = fixed_envelope();
    let rendered = serde_json::to_string_pretty(&envelope).unwrap();
    insta::assert_snapshot!("envelope_wire_shape", rendered);
}

#[test]
fn audit_entry_admitted_jsonl() {
    let entry = AuditLogEntry::admitted(fixed_envelope());
    let rendered = entry.to_jsonl_line().unwrap();
    insta::assert_snapshot!("audit_entry_admitted_jsonl", rendered);
}

#[test]
fn audit_entry_denied_jsonl() {
    let entry = AuditLogEntry::denied(fixed_envelope(), "capability_denied");
    let rendered = entry.to_jsonl_line().unwrap();
    insta::assert_snapshot!("audit_entry_denied_jsonl", rendered);
}
