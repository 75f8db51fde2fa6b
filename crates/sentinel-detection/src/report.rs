//! Incident reports.
//!
//! A reporter turns the artifacts of one remediated incident into a
//! human-readable summary. [`StubIncidentReporter`] renders it from templates;
//! other implementations can plug in behind [`IncidentReporter`].

use chrono::Utc;
use ops_sentinel_core::config::{ReportProvider, ReportingConfig};
use ops_sentinel_core::types::{
    ActionResult, AnalysisReport, IncidentReport, MetricPoint, PlanDecision,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Produces incident reports
pub trait IncidentReporter: Send + Sync {
    fn generate(
        &self,
        point: &MetricPoint,
        analysis: &AnalysisReport,
        decision: &PlanDecision,
        result: &ActionResult,
    ) -> IncidentReport;
}

/// Reporter selected by `config`, or `None` when reporting is disabled
pub fn build_reporter(config: &ReportingConfig) -> Option<Box<dyn IncidentReporter>> {
    if !config.enabled {
        return None;
    }
    match config.provider {
        ReportProvider::Stub => Some(Box::new(StubIncidentReporter)),
    }
}

/// Template-based reporter
#[derive(Debug, Clone, Copy, Default)]
pub struct StubIncidentReporter;

impl IncidentReporter for StubIncidentReporter {
    fn generate(
        &self,
        point: &MetricPoint,
        analysis: &AnalysisReport,
        decision: &PlanDecision,
        result: &ActionResult,
    ) -> IncidentReport {
        let top = analysis
            .top()
            .map(|h| h.name.as_str())
            .unwrap_or("unknown_anomaly");

        let mut metrics: BTreeMap<String, Value> = point
            .metrics
            .iter()
            .map(|(kind, value)| (kind.as_str().to_string(), Value::from(value)))
            .collect();
        metrics.insert("replicas".to_string(), Value::from(point.replicas));
        metrics.insert("version".to_string(), Value::String(point.version.clone()));

        IncidentReport {
            ts: Utc::now(),
            title: format!("Incident: {}", top),
            summary: format!(
                "Anomaly detected (score={:.2}). Action={} (conf={:.2}, risk={:.2}). Outcome={}.",
                analysis.anomaly.anomaly_score,
                decision.action,
                decision.confidence,
                decision.risk,
                result.outcome
            ),
            timeline: vec![
                format!("t0 anomaly: {}", analysis.anomaly.reason),
                format!("t1 analysis: {}", analysis.summary),
                format!("t2 decision: {}", decision.rationale),
                format!("t3 action: {} -> {}", result.action, result.outcome),
            ],
            metrics,
            action_taken: json!({ "decision": decision }),
            outcome: json!({ "result": result }),
        }
    }
}
