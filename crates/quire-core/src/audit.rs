//! Audit sinks for accepted operations

use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::document::{now_millis, DocumentId};
use crate::operation::Operation;

/// One accepted operation, as seen by an auditor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub path: DocumentId,
    pub author: String,
    pub version: u64,
    pub actions_summary: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl AuditRecord {
    pub fn new(path: &DocumentId, op: &Operation, version: u64) -> Self {
        Self {
            path: path.clone(),
            author: op.author.clone(),
            version,
            actions_summary: op.summary(),
            timestamp: now_millis(),
        }
    }
}

/// Receives a record per accepted operation.
///
/// Errors are logged by the caller and never fail the edit.
pub trait Auditor: Send + Sync {
    fn record(&self, record: &AuditRecord) -> std::io::Result<()>;
}

/// Emits records as `tracing` events under the `quire::audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditor;

impl Auditor for TracingAuditor {
    fn record(&self, record: &AuditRecord) -> std::io::Result<()> {
        info!(
            target: "quire::audit",
            path = %record.path,
            author = %record.author,
            version = record.version,
            actions = %record.actions_summary,
            timestamp = record.timestamp,
            "operation accepted"
        );
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonAuditor<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonAuditor<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> Auditor for JsonAuditor<W> {
    fn record(&self, record: &AuditRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut out = self.out.lock();
        out.write_all(&line)?;
        out.flush()
    }
}
