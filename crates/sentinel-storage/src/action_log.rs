//! Write-only sinks for executor action records.

use crate::jsonl::JsonlWriter;
use chrono::{DateTime, Utc};
use ops_sentinel_core::types::epoch_seconds;
use ops_sentinel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// One line of the action log: `{ts, event, payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogRecord {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub event: String,
    pub payload: Value,
}

impl ActionLogRecord {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            ts: Utc::now(),
            event: event.into(),
            payload,
        }
    }
}

/// Destination for action records
pub trait ActionSink: Send + Sync {
    /// Record one action event
    fn record(&self, record: &ActionLogRecord) -> Result<()>;
}

/// Appends action records to a JSONL file
#[derive(Debug)]
pub struct JsonlActionLog {
    writer: JsonlWriter,
}

impl JsonlActionLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: JsonlWriter::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}

impl ActionSink for JsonlActionLog {
    fn record(&self, record: &ActionLogRecord) -> Result<()> {
        self.writer.append(record)
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActionSink;

impl ActionSink for NoopActionSink {
    fn record(&self, _record: &ActionLogRecord) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct InMemoryActionSink {
    records: Mutex<Vec<ActionLogRecord>>,
}

impl InMemoryActionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<ActionLogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl ActionSink for InMemoryActionSink {
    fn record(&self, record: &ActionLogRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::storage("action sink lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl;
    use serde_json::json;

    #[test]
    fn test_jsonl_action_log_shape() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlActionLog::open(dir.path().join("logs/actions.jsonl")).unwrap();
        log.record(&ActionLogRecord::new(
            "execute",
            json!({"action": "scale", "outcome": "scaled_up", "cluster_state": {"replicas": 3}}),
        ))
        .unwrap();

        let scan: jsonl::Scan<Value> = jsonl::scan(log.path(), 10).unwrap();
        let line = &scan.records[0];
        assert_eq!(line["event"], json!("execute"));
        assert_eq!(line["payload"]["cluster_state"]["replicas"], json!(3));
        assert!(line["ts"].is_f64());
    }

    #[test]
    fn test_in_memory_sink() {
        let sink = InMemoryActionSink::new();
        sink.record(&ActionLogRecord::new("execute", json!({}))).unwrap();
        assert_eq!(sink.records().len(), 1);
        assert!(NoopActionSink.record(&ActionLogRecord::new("x", json!(null))).is_ok());
    }
}
