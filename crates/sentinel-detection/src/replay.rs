//! Offline replay of recorded metrics through a fresh monitor.
//!
//! Replay only exercises detection: the same points and configuration always
//! produce the same verdicts and scores, so thresholds can be tuned against a
//! recorded `metrics.jsonl`.

use crate::agents::MonitorAgent;
use ops_sentinel_core::config::MonitorConfig;
use ops_sentinel_core::types::{AnomalyReport, MetricPoint};
use ops_sentinel_core::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Totals of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub total_points: usize,
    pub warming_up: usize,
    pub anomalies: usize,
}

/// Verdicts for every point plus totals
#[derive(Debug, Clone)]
pub struct ReplayRun {
    pub reports: Vec<AnomalyReport>,
    pub summary: ReplaySummary,
}

/// Feed `points` through a new [`MonitorAgent`] in observe-then-detect order
pub fn replay_monitor<I>(points: I, config: &MonitorConfig) -> Result<ReplayRun>
where
    I: IntoIterator<Item = MetricPoint>,
{
    let mut monitor = MonitorAgent::new(config.clone())?;
    let mut summary = ReplaySummary::default();
    let mut reports = Vec::new();

    for point in points {
        let report = monitor.process(&point);
        summary.total_points += 1;
        if report.is_warming_up() {
            summary.warming_up += 1;
        } else if report.is_anomaly {
            summary.anomalies += 1;
        }
        reports.push(report);
    }

    info!(
        total_points = summary.total_points,
        anomalies = summary.anomalies,
        "Replay done"
    );
    Ok(ReplayRun { reports, summary })
}
