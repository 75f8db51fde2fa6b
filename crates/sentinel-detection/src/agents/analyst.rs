//! Analyst Agent
//!
//! Generates ranked causal hypotheses for an anomaly.
//!
//! # Hypothesis generation
//!
//! Each abnormal metric maps to one hypothesis, in fixed order:
//!
//! | metric | hypothesis |
//! |---|---|
//! | cpu | `cpu_saturation` |
//! | mem | `memory_pressure_or_leak` |
//! | lat_ms | `network_latency_or_downstream_slow` |
//! | err | `error_burst_or_bad_deploy` |
//!
//! When errors and latency are abnormal together both of their hypotheses are
//! boosted. Past outcomes stored in memory then raise the error hypothesis
//! (successful rollbacks, and restarts at half weight) and the cpu hypothesis
//! (successful scale-outs) for the same signature.

use chrono::Utc;
use ops_sentinel_core::config::AnalystConfig;
use ops_sentinel_core::types::{
    Action, AnalysisReport, AnomalyReport, Hypothesis, HypothesisKind, MetricKind, Metrics,
};
use ops_sentinel_storage::memory::MemoryStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Boost applied to latency and error hypotheses when both metrics are abnormal
pub const COUPLING_BOOST: f64 = 0.10;

/// Evidence tag for coupled error and latency anomalies
pub const COUPLING_TAG: &str = "coupled(ERR+LAT)";

/// Largest likelihood boost memory can contribute per action
pub const MEMORY_MAX_BOOST: f64 = 0.10;

/// Signature used when nothing is abnormal
pub const EMPTY_SIGNATURE: &str = "none";

/// Root-cause analyst
pub struct AnalystAgent {
    config: AnalystConfig,
    memory: Arc<MemoryStore>,
}

impl std::fmt::Debug for AnalystAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalystAgent")
            .field("config", &self.config)
            .field("memory", &self.memory.path())
            .finish()
    }
}

impl AnalystAgent {
    pub fn new(config: AnalystConfig, memory: Arc<MemoryStore>) -> Self {
        info!(memory = %memory.path().display(), "Creating Analyst Agent");
        Self { config, memory }
    }

    /// Deterministic key for an anomaly's shape, e.g. `cpu:pos|err:neg`.
    ///
    /// Abnormal metric names are sorted and tagged with the sign of their
    /// z-score; an empty set maps to `"none"`.
    pub fn signature(anomaly: &AnomalyReport) -> String {
        let mut parts: Vec<(&str, f64)> = anomaly
            .abnormal_metrics
            .iter()
            .map(|(kind, z)| (kind.as_str(), *z))
            .collect();
        if parts.is_empty() {
            return EMPTY_SIGNATURE.to_string();
        }
        parts.sort_by(|a, b| a.0.cmp(b.0));
        parts
            .into_iter()
            .map(|(name, z)| format!("{}:{}", name, if z >= 0.0 { "pos" } else { "neg" }))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Rank hypotheses for `anomaly` given the latest observed metrics
    pub fn analyze(&self, anomaly: &AnomalyReport, latest: &Metrics) -> AnalysisReport {
        let abnormal = &anomaly.abnormal_metrics;
        let mut hypotheses: Vec<Hypothesis> = Vec::new();

        for kind in MetricKind::ALL {
            let Some(z) = abnormal.get(&kind) else {
                continue;
            };
            let (name, base) = match kind {
                MetricKind::Cpu => (HypothesisKind::CpuSaturation, self.config.base_cpu),
                MetricKind::Mem => (HypothesisKind::MemoryPressureOrLeak, self.config.base_mem),
                MetricKind::LatMs => (
                    HypothesisKind::NetworkLatencyOrDownstreamSlow,
                    self.config.base_latency,
                ),
                MetricKind::Err => (HypothesisKind::ErrorBurstOrBadDeploy, self.config.base_errors),
            };
            let mut hypothesis = Hypothesis::new(name, base, format!("{} z={:.2}", kind, z));
            hypothesis
                .evidence
                .push(format!("{} observed={:.2}", kind, latest.get(kind)));
            hypotheses.push(hypothesis);
        }

        if hypotheses.is_empty() {
            hypotheses.push(Hypothesis::new(
                HypothesisKind::UnknownAnomaly,
                self.config.base_unknown,
                format!("abnormal=[{}]", anomaly.abnormal_names().join(", ")),
            ));
        }

        if abnormal.contains_key(&MetricKind::Err) && abnormal.contains_key(&MetricKind::LatMs) {
            for h in hypotheses.iter_mut().filter(|h| {
                matches!(
                    h.name,
                    HypothesisKind::NetworkLatencyOrDownstreamSlow
                        | HypothesisKind::ErrorBurstOrBadDeploy
                )
            }) {
                h.boost(COUPLING_BOOST);
                h.evidence.push(COUPLING_TAG.to_string());
            }
        }

        let signature = Self::signature(anomaly);
        let rollback = self.memory.bias(&signature, Action::Rollback, 0.0, MEMORY_MAX_BOOST);
        let restart = self.memory.bias(&signature, Action::Restart, 0.0, MEMORY_MAX_BOOST);
        let scale = self.memory.bias(&signature, Action::Scale, 0.0, MEMORY_MAX_BOOST);

        for h in hypotheses.iter_mut() {
            match h.name {
                HypothesisKind::ErrorBurstOrBadDeploy => h.boost(rollback + 0.5 * restart),
                HypothesisKind::CpuSaturation => h.boost(scale),
                _ => {}
            }
        }

        // stable: ties keep generation order
        hypotheses.sort_by(|a, b| b.likelihood.total_cmp(&a.likelihood));

        let summary = hypotheses
            .first()
            .map(|top| format!("Top: {} ({:.2})", top.name, top.likelihood))
            .unwrap_or_default();

        debug!(
            signature = %signature,
            rollback_boost = rollback,
            restart_boost = restart,
            scale_boost = scale,
            hypotheses = hypotheses.len(),
            "Memory bias applied"
        );
        info!(signature = %signature, summary = %summary, "Analysis complete");

        AnalysisReport {
            ts: Utc::now(),
            anomaly: anomaly.clone(),
            hypotheses,
            summary,
        }
    }
}
