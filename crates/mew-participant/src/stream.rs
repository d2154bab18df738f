// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-stream monotonic sequence tracking for `stream/*` envelopes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// State for one open stream, either initiated locally or by a peer.
#[derive(Debug)]
pub struct StreamHandle {
    /// Gateway- or peer-assigned stream identifier.
    pub stream_id: String,
    /// The other participant in this stream, when known.
    pub peer: Option<String>,
    next_seq: AtomicU64,
}

impl StreamHandle {
    /// Create a handle for a freshly opened stream with the given peer.
    #[must_use]
    pub fn new(stream_id: impl Into<String>, peer: Option<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            peer,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number to stamp on an outgoing
    /// `stream/data` chunk, advancing the counter.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }
}

/// A table of currently open streams, keyed by stream id.
#[derive(Default)]
pub struct StreamTable {
    streams: Mutex<HashMap<String, Arc<StreamHandle>>>,
}

impl StreamTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened stream.
    pub fn open(&self, stream_id: impl Into<String>, peer: Option<String>) -> Arc<StreamHandle> {
        let handle = Arc::new(StreamHandle::new(stream_id, peer));
        self.streams
            .lock()
            .expect("stream table mutex poisoned")
            .insert(handle.stream_id.clone(), handle.clone());
        handle
    }

    /// Look up an open stream by id.
    #[must_use]
    pub fn get(&self, stream_id: &str) -> Option<Arc<StreamHandle>> {
        self.streams.lock().expect("stream table mutex poisoned").get(stream_id).cloned()
    }

    /// Remove a stream, e.g. on `stream/close` or idle timeout.
    pub fn close(&self, stream_id: &str) -> Option<Arc<StreamHandle>> {
        self.streams.lock().expect("stream table mutex poisoned").remove(stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic_per_stream() {
        let table = StreamTable::new();
        let handle = table.open("stream-1", Some("bob".to_string()));
        assert_eq!(handle.next_sequence(), 0);
        assert_eq!(handle.next_sequence(), 1);
        assert_eq!(handle.next_sequence(), 2);
    }

    #[test]
    fn close_removes_stream_from_table() {
        let table = StreamTable::new();
        table.open("stream-1", None);
        assert!(table.close("stream-1").is_some());
        assert!(table.get("stream-1").is_none());
    }
}
