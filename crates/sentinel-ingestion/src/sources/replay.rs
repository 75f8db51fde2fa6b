//! Replay of a recorded `metrics.jsonl` stream.
//!
//! Each non-blank line must carry every metric field; `ts`, `replicas` and
//! `version` are optional. The cluster state passed to [`MetricSource`] is
//! ignored since the recording already reflects the actions taken at the time.

use super::MetricSource;
use ops_sentinel_core::types::{ClusterState, MetricPoint};
use ops_sentinel_core::{Error, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reads metric points back from a JSONL file
#[derive(Debug)]
pub struct JsonlReplaySource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonlReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::storage(format!("Failed to open {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Replaying metrics");
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, line: &str) -> Result<MetricPoint> {
        let record: Value = serde_json::from_str(line)?;
        MetricPoint::from_json(&record)
    }
}

impl Iterator for JsonlReplaySource {
    type Item = Result<MetricPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed = self.parse(line);
            if let Err(e) = &parsed {
                warn!(
                    path = %self.path.display(),
                    line = self.line_no,
                    error = %e,
                    "Invalid metric record"
                );
            }
            return Some(parsed);
        }
    }
}

impl MetricSource for JsonlReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn next_point(&mut self, _state: &ClusterState) -> Option<Result<MetricPoint>> {
        self.next()
    }
}
