//! Outcome memory.
//!
//! The memory log is the loop's only learning mechanism: every executed (or
//! cooldown-blocked) decision is appended as one JSONL record, and the
//! historical success rate of a `(signature, action)` pair biases future
//! hypothesis likelihoods and action confidences.
//!
//! The log stays the durable source of truth. Bias queries are served from an
//! in-memory tally rebuilt from the log on open and updated on append until
//! it covers `scan_limit` lines.

use crate::jsonl::{self, JsonlWriter, Scan};
use chrono::Utc;
use dashmap::DashMap;
use ops_sentinel_core::types::{clamp01, Action, MemoryRecord};
use ops_sentinel_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Default number of log lines indexed for bias queries.
///
/// The index covers the first lines of the log. Once it holds this many,
/// later appends are still written but no longer move the tally.
pub const DEFAULT_SCAN_LIMIT: usize = 5000;

/// Below this many matching records no bias is applied
pub const MIN_EVIDENCE: u64 = 2;

/// Matching records needed for full evidence weight
pub const FULL_WEIGHT_RECORDS: f64 = 10.0;

/// Success tally for one `(signature, action)` pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRate {
    pub successes: u64,
    pub total: u64,
}

impl SuccessRate {
    /// Fraction of successful outcomes, 0 when nothing was recorded
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successes += 1;
        }
    }
}

/// Per-pair line of [`MemoryStore::summary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub signature: String,
    pub action: Action,
    pub successes: u64,
    pub total: u64,
    pub rate: f64,
}

/// Durable append-only store of past outcomes
#[derive(Debug)]
pub struct MemoryStore {
    writer: JsonlWriter,
    tally: DashMap<(String, Action), SuccessRate>,
    indexed: AtomicUsize,
    scan_limit: usize,
}

impl MemoryStore {
    /// Open (or create) the memory log with the default scan limit
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limit(path, DEFAULT_SCAN_LIMIT)
    }

    /// Open the memory log, indexing at most `scan_limit` lines
    pub fn open_with_limit(path: impl AsRef<Path>, scan_limit: usize) -> Result<Self> {
        let writer = JsonlWriter::open(path.as_ref())?;
        let scan: Scan<MemoryRecord> = jsonl::scan(writer.path(), scan_limit)?;

        let tally: DashMap<(String, Action), SuccessRate> = DashMap::new();
        for record in &scan.records {
            tally
                .entry((record.signature.clone(), record.action))
                .or_default()
                .record(record.success);
        }

        if scan.skipped > 0 {
            warn!(
                path = %writer.path().display(),
                skipped = scan.skipped,
                "Skipped malformed memory records"
            );
        }
        info!(
            path = %writer.path().display(),
            records = scan.records.len(),
            pairs = tally.len(),
            "Memory store loaded"
        );

        Ok(Self {
            writer,
            tally,
            indexed: AtomicUsize::new(scan.lines_read),
            scan_limit,
        })
    }

    /// Append one outcome record
    pub fn append(
        &self,
        signature: &str,
        action: Action,
        success: bool,
        outcome: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Result<MemoryRecord> {
        let record = MemoryRecord {
            ts: Utc::now(),
            signature: signature.to_string(),
            action,
            success,
            outcome: outcome.to_string(),
            metadata,
        };
        self.writer.append(&record)?;

        if self.indexed.fetch_add(1, Ordering::SeqCst) < self.scan_limit {
            self.tally
                .entry((record.signature.clone(), action))
                .or_default()
                .record(success);
        }

        debug!(
            signature = %signature,
            action = %action,
            success,
            outcome = %outcome,
            "Memory record appended"
        );
        Ok(record)
    }

    /// Historical success tally of a pair
    pub fn success_rate(&self, signature: &str, action: Action) -> SuccessRate {
        self.tally
            .get(&(signature.to_string(), action))
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Bias `base` by the pair's historical success rate.
    ///
    /// With fewer than [`MIN_EVIDENCE`] matching records `base` is returned
    /// unchanged. Otherwise the boost is `max_boost * rate * weight` where
    /// `weight = min(1, total / 10)`, and the result is clamped to `[0, 1]`.
    pub fn bias(&self, signature: &str, action: Action, base: f64, max_boost: f64) -> f64 {
        let tally = self.success_rate(signature, action);
        if tally.total < MIN_EVIDENCE {
            return base;
        }
        let weight = (tally.total as f64 / FULL_WEIGHT_RECORDS).min(1.0);
        clamp01(base + max_boost * tally.rate() * weight)
    }

    /// Re-read every record from the log
    pub fn records(&self) -> Result<Scan<MemoryRecord>> {
        jsonl::scan(self.writer.path(), usize::MAX)
    }

    /// Tallies of every indexed pair, sorted by signature then action
    pub fn summary(&self) -> Vec<MemorySummary> {
        let mut rows: Vec<MemorySummary> = self
            .tally
            .iter()
            .map(|entry| {
                let (signature, action) = entry.key();
                let tally = entry.value();
                MemorySummary {
                    signature: signature.clone(),
                    action: *action,
                    successes: tally.successes,
                    total: tally.total,
                    rate: tally.rate(),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            a.signature
                .cmp(&b.signature)
                .then_with(|| a.action.as_str().cmp(b.action.as_str()))
        });
        rows
    }

    /// Flush the log to disk
    pub fn sync(&self) -> Result<()> {
        self.writer.sync()
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}
