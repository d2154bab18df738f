// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only audit log writer.
//!
//! A write failure here is fatal to the space per the gateway's failure
//! semantics: rather than silently drop audit records, the caller must
//! transition the space into its closed/fatal state.

use std::path::PathBuf;

use mew_types::AuditLogEntry;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Serializes writes to a single newline-delimited-JSON audit log file.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl AuditLog {
    /// Open (creating if necessary) the audit log at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one entry as a single JSONL line, regardless of how many
    /// recipients the underlying envelope fanned out to.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error on write failure; the gateway core
    /// treats this as fatal and halts admission.
    pub async fn append(&self, entry: &AuditLogEntry) -> std::io::Result<()> {
        let mut line = entry
            .to_jsonl_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut guard = self.file.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.flush().await
    }

    /// Path this log is writing to, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_types::EnvelopeBuilder;

    #[tokio::test]
    async fn append_then_read_back_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        let log = AuditLog::open(&path).await.unwrap();

        let env = EnvelopeBuilder::new("chat").from("alice").build().unwrap();
        log.append(&AuditLogEntry::admitted(env)).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        AuditLogEntry::from_jsonl_line(lines[0]).unwrap();
    }

    #[tokio::test]
    async fn reopen_appends_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log.jsonl");
        {
            let log = AuditLog::open(&path).await.unwrap();
            let env = EnvelopeBuilder::new("chat").from("alice").build().unwrap();
            log.append(&AuditLogEntry::admitted(env)).await.unwrap();
        }
        {
            let log = AuditLog::open(&path).await.unwrap();
            let env = EnvelopeBuilder::new("chat").from("bob").build().unwrap();
            log.append(&AuditLogEntry::admitted(env)).await.unwrap();
        }
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
