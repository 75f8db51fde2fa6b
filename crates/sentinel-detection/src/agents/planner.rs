//! Planner Agent
//!
//! Maps the top hypothesis to a remediation action and gates it behind the
//! auto-remediation policy. Anything that fails the gate is escalated to a
//! human instead, with the original proposal kept in the decision metadata.

use super::analyst::AnalystAgent;
use chrono::Utc;
use ops_sentinel_core::config::PlannerConfig;
use ops_sentinel_core::types::{clamp01, Action, AnalysisReport, HypothesisKind, PlanDecision};
use ops_sentinel_storage::memory::MemoryStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest confidence boost memory can contribute
pub const MEMORY_MAX_BOOST: f64 = 0.20;

/// Risk added per abnormal metric beyond the first
pub const RISK_PER_EXTRA_METRIC: f64 = 0.05;

/// Default action, base confidence and base risk for a hypothesis
pub fn playbook(name: HypothesisKind, likelihood: f64) -> (Action, f64, f64) {
    match name {
        HypothesisKind::CpuSaturation => (Action::Scale, (likelihood + 0.10).min(0.95), 0.25),
        HypothesisKind::MemoryPressureOrLeak => {
            (Action::Restart, (likelihood + 0.05).min(0.90), 0.30)
        }
        HypothesisKind::ErrorBurstOrBadDeploy => {
            (Action::Rollback, (likelihood + 0.08).min(0.92), 0.32)
        }
        HypothesisKind::NetworkLatencyOrDownstreamSlow => (Action::Escalate, likelihood, 0.15),
        HypothesisKind::UnknownAnomaly => (Action::Escalate, likelihood, 0.20),
    }
}

/// Policy-gated action planner
pub struct PlannerAgent {
    config: PlannerConfig,
    memory: Arc<MemoryStore>,
}

impl std::fmt::Debug for PlannerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerAgent")
            .field("config", &self.config)
            .field("memory", &self.memory.path())
            .finish()
    }
}

impl PlannerAgent {
    pub fn new(config: PlannerConfig, memory: Arc<MemoryStore>) -> Self {
        info!(
            auto_confidence_threshold = config.auto_confidence_threshold,
            auto_risk_threshold = config.auto_risk_threshold,
            "Creating Planner Agent"
        );
        Self { config, memory }
    }

    /// Decide what to do about an analysed anomaly
    pub fn plan(&self, analysis: &AnalysisReport) -> PlanDecision {
        let (top_name, likelihood) = analysis
            .top()
            .map(|h| (h.name, h.likelihood))
            .unwrap_or((HypothesisKind::UnknownAnomaly, 0.0));
        let signature = AnalystAgent::signature(&analysis.anomaly);

        let (action, base_confidence, base_risk) = playbook(top_name, likelihood);
        let confidence = self
            .memory
            .bias(&signature, action, clamp01(base_confidence), MEMORY_MAX_BOOST);
        let extra = analysis.anomaly.abnormal_metrics.len().saturating_sub(1) as f64;
        let risk = clamp01(base_risk + RISK_PER_EXTRA_METRIC * extra);

        let mut metadata = BTreeMap::new();
        metadata.insert("signature".to_string(), Value::String(signature.clone()));
        metadata.insert(
            "top_hypothesis".to_string(),
            Value::String(top_name.as_str().to_string()),
        );

        let auto_ok = confidence >= self.config.auto_confidence_threshold
            && risk <= self.config.auto_risk_threshold
            && action != Action::Noop;

        if !auto_ok {
            warn!(
                signature = %signature,
                proposed = %action,
                confidence,
                risk,
                "Policy blocked auto-action, escalating"
            );
            metadata.insert(
                "proposed_action".to_string(),
                Value::String(action.as_str().to_string()),
            );
            return PlanDecision {
                ts: Utc::now(),
                action: Action::Escalate,
                confidence,
                risk,
                rationale: format!(
                    "Policy blocked auto-action. Proposed={} conf={:.2} risk={:.2}; escalating.",
                    action, confidence, risk
                ),
                metadata,
            };
        }

        info!(
            signature = %signature,
            action = %action,
            confidence,
            risk,
            "Auto-action approved"
        );
        PlanDecision {
            ts: Utc::now(),
            action,
            confidence,
            risk,
            rationale: format!(
                "Chosen action={} based on {}. conf={:.2} risk={:.2}",
                action, top_name, confidence, risk
            ),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_sentinel_core::types::{AnomalyReport, Hypothesis, MetricKind};

    fn analysis(
        top: HypothesisKind,
        likelihood: f64,
        abnormal: &[(MetricKind, f64)],
    ) -> AnalysisReport {
        AnalysisReport {
            ts: Utc::now(),
            anomaly: AnomalyReport {
                ts: Utc::now(),
                is_anomaly: true,
                anomaly_score: 4.0,
                abnormal_metrics: abnormal.iter().copied().collect(),
                window_size: 30,
                reason: "test".to_string(),
            },
            hypotheses: vec![Hypothesis::new(top, likelihood, "test")],
            summary: String::new(),
        }
    }

    fn planner() -> (tempfile::TempDir, Arc<MemoryStore>, PlannerAgent) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::open(dir.path().join("memory.jsonl")).unwrap());
        let agent = PlannerAgent::new(PlannerConfig::default(), memory.clone());
        (dir, memory, agent)
    }

    #[test]
    fn test_playbook_caps() {
        assert_eq!(playbook(HypothesisKind::CpuSaturation, 0.9).1, 0.95);
        assert_eq!(playbook(HypothesisKind::MemoryPressureOrLeak, 0.9).1, 0.90);
        assert_eq!(playbook(HypothesisKind::ErrorBurstOrBadDeploy, 0.9).1, 0.92);
        assert_eq!(
            playbook(HypothesisKind::NetworkLatencyOrDownstreamSlow, 0.4).0,
            Action::Escalate
        );
    }

    #[test]
    fn test_low_confidence_escalates() {
        let (_dir, _memory, agent) = planner();
        let report = analysis(HypothesisKind::CpuSaturation, 0.55, &[(MetricKind::Cpu, 4.0)]);
        let decision = agent.plan(&report);

        assert_eq!(decision.action, Action::Escalate);
        assert_eq!(decision.proposed_action(), Some(Action::Scale));
        assert!((decision.confidence - 0.65).abs() < 1e-9);
        assert_eq!(decision.risk, 0.25);
        assert_eq!(
            decision.rationale,
            "Policy blocked auto-action. Proposed=scale conf=0.65 risk=0.25; escalating."
        );
        assert_eq!(decision.metadata["signature"], "cpu:pos");
        assert_eq!(decision.metadata["top_hypothesis"], "cpu_saturation");
    }

    #[test]
    fn test_confident_low_risk_action_commits() {
        let (_dir, _memory, agent) = planner();
        let report = analysis(HypothesisKind::CpuSaturation, 0.70, &[(MetricKind::Cpu, 5.0)]);
        let decision = agent.plan(&report);

        assert_eq!(decision.action, Action::Scale);
        assert!(!decision.was_overridden());
        assert_eq!(
            decision.rationale,
            "Chosen action=scale based on cpu_saturation. conf=0.80 risk=0.25"
        );
    }

    #[test]
    fn test_risk_grows_with_abnormal_metrics() {
        let (_dir, _memory, agent) = planner();
        let decision = agent.plan(&analysis(
            HypothesisKind::CpuSaturation,
            0.90,
            &[(MetricKind::Cpu, 5.0), (MetricKind::Mem, 4.0), (MetricKind::Err, 3.0)],
        ));
        assert!((decision.risk - 0.35).abs() < 1e-9);

        let decision = agent.plan(&analysis(
            HypothesisKind::CpuSaturation,
            0.90,
            &[
                (MetricKind::Cpu, 5.0),
                (MetricKind::Mem, 4.0),
                (MetricKind::LatMs, 4.0),
                (MetricKind::Err, 3.0),
            ],
        ));
        assert!((decision.risk - 0.40).abs() < 1e-9);
        assert_eq!(decision.action, Action::Escalate);
        assert_eq!(decision.proposed_action(), Some(Action::Scale));

        let decision = agent.plan(&analysis(
            HypothesisKind::MemoryPressureOrLeak,
            0.90,
            &[(MetricKind::Cpu, 5.0), (MetricKind::Mem, 4.0)],
        ));
        assert!((decision.risk - 0.35).abs() < 1e-9);
        assert_eq!(decision.action, Action::Restart);
    }

    #[test]
    fn test_memory_raises_confidence_over_gate() {
        let (_dir, memory, agent) = planner();
        for _ in 0..10 {
            memory
                .append("cpu:pos", Action::Scale, true, "scaled_up", BTreeMap::new())
                .unwrap();
        }
        let report = analysis(HypothesisKind::CpuSaturation, 0.55, &[(MetricKind::Cpu, 4.0)]);
        let decision = agent.plan(&report);
        // 0.65 + 0.20
        assert!((decision.confidence - 0.85).abs() < 1e-9);
        assert_eq!(decision.action, Action::Scale);
    }

    #[test]
    fn test_escalate_proposal_still_records_proposal_when_blocked() {
        let (_dir, _memory, agent) = planner();
        let decision = agent.plan(&analysis(
            HypothesisKind::NetworkLatencyOrDownstreamSlow,
            0.5,
            &[(MetricKind::LatMs, 5.0)],
        ));
        assert_eq!(decision.action, Action::Escalate);
        assert_eq!(decision.proposed_action(), Some(Action::Escalate));
    }

    #[test]
    fn test_outputs_stay_in_unit_interval() {
        let (_dir, memory, agent) = planner();
        for _ in 0..20 {
            memory
                .append("cpu:pos", Action::Scale, true, "scaled_up", BTreeMap::new())
                .unwrap();
        }
        let report = analysis(HypothesisKind::CpuSaturation, 1.0, &[(MetricKind::Cpu, 9.0)]);
        let decision = agent.plan(&report);
        assert!((0.0..=1.0).contains(&decision.confidence));
        assert!((0.0..=1.0).contains(&decision.risk));
    }
}
