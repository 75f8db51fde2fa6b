//! Replayable metric and incident telemetry.
//!
//! `metrics.jsonl` holds one flat record per tick and is the input format of
//! the replay source. `incidents.jsonl` holds one record per lifecycle stage
//! of every incident, keyed by `incident_id`.

use crate::jsonl::JsonlWriter;
use chrono::Utc;
use ops_sentinel_core::types::{epoch_seconds, MetricPoint};
use ops_sentinel_core::Result;
use serde_json::{Map, Value};
use std::path::Path;

/// Writers for metric and incident telemetry
#[derive(Debug)]
pub struct TelemetryLog {
    metrics: JsonlWriter,
    incidents: JsonlWriter,
}

impl TelemetryLog {
    pub fn open(metrics_path: impl AsRef<Path>, incidents_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            metrics: JsonlWriter::open(metrics_path)?,
            incidents: JsonlWriter::open(incidents_path)?,
        })
    }

    /// Record one tick: `{ts, cpu, mem, lat_ms, err, replicas, version, scenario}`
    pub fn log_metric(&self, point: &MetricPoint, scenario: Option<&str>) -> Result<()> {
        let mut record = match serde_json::to_value(point)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert(
            "scenario".to_string(),
            scenario.map_or(Value::Null, |s| Value::String(s.to_string())),
        );
        self.metrics.append(&Value::Object(record))
    }

    /// Record one incident stage: `{ts, incident_id, stage, ...fields}`
    pub fn log_incident(&self, incident_id: &str, stage: &str, fields: Value) -> Result<()> {
        let mut record = Map::new();
        record.insert("ts".to_string(), Value::from(epoch_seconds::to_f64(&Utc::now())));
        record.insert("incident_id".to_string(), Value::String(incident_id.to_string()));
        record.insert("stage".to_string(), Value::String(stage.to_string()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        }
        self.incidents.append(&Value::Object(record))
    }

    pub fn metrics_path(&self) -> &Path {
        self.metrics.path()
    }

    pub fn incidents_path(&self) -> &Path {
        self.incidents.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl;
    use ops_sentinel_core::types::Metrics;
    use serde_json::json;

    #[test]
    fn test_metric_records_round_trip_through_point_parser() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::open(
            dir.path().join("logs/metrics.jsonl"),
            dir.path().join("logs/incidents.jsonl"),
        )
        .unwrap();

        let point = MetricPoint::new(
            Metrics {
                cpu: 35.0,
                mem: 40.0,
                lat_ms: 120.0,
                err: 1.0,
            },
            2,
            "v3",
        );
        log.log_metric(&point, Some("cpu_spike")).unwrap();

        let scan: jsonl::Scan<Value> = jsonl::scan(log.metrics_path(), 10).unwrap();
        assert_eq!(scan.records[0]["scenario"], json!("cpu_spike"));
        let parsed = MetricPoint::from_json(&scan.records[0]).unwrap();
        assert_eq!(parsed.metrics, point.metrics);
        assert_eq!(parsed.version, "v3");
    }

    #[test]
    fn test_incident_record_flattens_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log =
            TelemetryLog::open(dir.path().join("m.jsonl"), dir.path().join("i.jsonl")).unwrap();
        log.log_incident("ab12cd34", "detect", json!({"anomaly_score": 4.2}))
            .unwrap();

        let scan: jsonl::Scan<Value> = jsonl::scan(log.incidents_path(), 10).unwrap();
        let record = &scan.records[0];
        assert_eq!(record["incident_id"], json!("ab12cd34"));
        assert_eq!(record["stage"], json!("detect"));
        assert_eq!(record["anomaly_score"], json!(4.2));
    }
}
