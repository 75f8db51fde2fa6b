//! Monitor Agent
//!
//! Turns each metric snapshot into an anomaly verdict against a rolling
//! window of recent history.
//!
//! # Scoring
//!
//! Every metric is z-scored against its window. Metrics with `|z|` at or above
//! `z_threshold` are abnormal. The anomaly score is the largest `|z|` across
//! all metrics plus `0.25` for every abnormal metric beyond the first, and the
//! verdict is positive only when both `min_abnormal_metrics` and
//! `score_threshold` are met.
//!
//! Until every metric holds a full window the agent reports `warming_up`.

use crate::stats::{RollingWindow, WindowStats};
use ops_sentinel_core::config::MonitorConfig;
use ops_sentinel_core::types::{AnomalyReport, MetricKind, MetricPoint};
use ops_sentinel_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Score added per abnormal metric beyond the first
pub const MULTI_METRIC_BONUS: f64 = 0.25;

/// Monitor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Points pushed into the window
    pub observed: u64,
    /// Verdicts produced after warm-up
    pub evaluated: u64,
    /// Positive verdicts
    pub anomalies: u64,
}

/// Anomaly score for a set of z-scores with `abnormal` of them over threshold
pub fn anomaly_score(zscores: &BTreeMap<MetricKind, f64>, abnormal: usize) -> f64 {
    let max_abs_z = zscores.values().map(|z| z.abs()).fold(0.0, f64::max);
    max_abs_z + MULTI_METRIC_BONUS * abnormal.saturating_sub(1) as f64
}

/// Rolling z-score anomaly detector
#[derive(Debug, Clone)]
pub struct MonitorAgent {
    config: MonitorConfig,
    window: RollingWindow,
    stats: MonitorStats,
}

impl MonitorAgent {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        info!(
            window_size = config.window_size,
            z_threshold = config.z_threshold,
            score_threshold = config.score_threshold,
            min_abnormal_metrics = config.min_abnormal_metrics,
            "Creating Monitor Agent"
        );

        Ok(Self {
            window: RollingWindow::new(config.window_size)?,
            config,
            stats: MonitorStats::default(),
        })
    }

    /// Push the point's metrics into the window
    pub fn observe(&mut self, point: &MetricPoint) {
        self.window.push(&point.metrics);
        self.stats.observed += 1;
    }

    /// Evaluate a point against the current window without observing it
    pub fn detect(&mut self, point: &MetricPoint) -> AnomalyReport {
        if !self.window.ready() {
            return AnomalyReport::warming_up(point.ts, self.config.window_size);
        }
        self.stats.evaluated += 1;

        let zscores = self.window.zscores(&point.metrics);
        let abnormal: BTreeMap<MetricKind, f64> = zscores
            .iter()
            .filter(|(_, z)| z.abs() >= self.config.z_threshold)
            .map(|(kind, z)| (*kind, *z))
            .collect();

        let score = anomaly_score(&zscores, abnormal.len());
        let is_anomaly = abnormal.len() >= self.config.min_abnormal_metrics
            && score >= self.config.score_threshold;

        debug!(
            score,
            abnormal = abnormal.len(),
            cpu_z = zscores.get(&MetricKind::Cpu).copied().unwrap_or_default(),
            mem_z = zscores.get(&MetricKind::Mem).copied().unwrap_or_default(),
            lat_z = zscores.get(&MetricKind::LatMs).copied().unwrap_or_default(),
            err_z = zscores.get(&MetricKind::Err).copied().unwrap_or_default(),
            "Monitor evaluated point"
        );

        let reason = if is_anomaly {
            self.stats.anomalies += 1;
            let mut keys: Vec<&str> = abnormal.keys().map(MetricKind::as_str).collect();
            keys.sort_unstable();
            format!("zscore_spike({}) score={:.2}", keys.join(","), score)
        } else {
            "normal".to_string()
        };

        AnomalyReport {
            ts: point.ts,
            is_anomaly,
            anomaly_score: score,
            abnormal_metrics: abnormal,
            window_size: self.config.window_size,
            reason,
        }
    }

    /// Observe then detect: the order the loop uses
    pub fn process(&mut self, point: &MetricPoint) -> AnomalyReport {
        self.observe(point);
        self.detect(point)
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Current window statistics for one metric
    pub fn window_stats(&self, key: MetricKind) -> Option<WindowStats> {
        self.window.stats(key)
    }
}
