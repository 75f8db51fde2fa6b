//! # Remediation Loop
//!
//! Drives one metric point through every stage:
//!
//! ```text
//! MetricPoint -> Monitor -> Analyst -> Planner -> Executor -> Memory
//!                   │          ▲          ▲                     │
//!                   │          └──────────┴──── bias ───────────┘
//!                   └── normal / warming up: stop
//! ```
//!
//! The loop owns the [`ClusterState`] and lends it to the executor once per
//! incident. Each positive verdict opens an incident with a short id; the
//! incident's stages are written to the optional telemetry log and its
//! outcome is appended to memory before `tick` returns.

use crate::agents::{AnalystAgent, ExecutorAgent, MonitorAgent, MonitorStats, PlannerAgent};
use crate::report::IncidentReporter;
use crate::stats::WindowStats;
use ops_sentinel_core::config::Config;
use ops_sentinel_core::types::{
    ActionResult, AnalysisReport, AnomalyReport, ClusterState, IncidentReport, LifecycleStage,
    MemoryRecord, MetricKind, MetricPoint, PlanDecision,
};
use ops_sentinel_core::Result;
use ops_sentinel_storage::action_log::ActionSink;
use ops_sentinel_storage::memory::MemoryStore;
use ops_sentinel_storage::telemetry::TelemetryLog;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything one tick produced
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// Last lifecycle stage reached
    pub stage: LifecycleStage,
    /// Every stage entered this tick, in order
    pub trail: Vec<LifecycleStage>,
    pub anomaly: AnomalyReport,
    pub incident_id: Option<String>,
    pub analysis: Option<AnalysisReport>,
    pub decision: Option<PlanDecision>,
    pub result: Option<ActionResult>,
    pub memory_record: Option<MemoryRecord>,
    pub report: Option<IncidentReport>,
}

impl TickOutcome {
    fn quiet(stage: LifecycleStage, anomaly: AnomalyReport) -> Self {
        Self {
            stage,
            trail: vec![stage],
            anomaly,
            incident_id: None,
            analysis: None,
            decision: None,
            result: None,
            memory_record: None,
            report: None,
        }
    }

    /// Whether the tick opened an incident
    pub fn is_incident(&self) -> bool {
        self.incident_id.is_some()
    }
}

/// Closed-loop pipeline over a stream of metric points
pub struct RemediationLoop {
    monitor: MonitorAgent,
    analyst: AnalystAgent,
    planner: PlannerAgent,
    executor: ExecutorAgent,
    memory: Arc<MemoryStore>,
    telemetry: Option<TelemetryLog>,
    reporter: Option<Box<dyn IncidentReporter>>,
    scenario: Option<String>,
    state: ClusterState,
    incidents: u64,
}

impl std::fmt::Debug for RemediationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationLoop")
            .field("monitor", &self.monitor)
            .field("executor", &self.executor)
            .field("state", &self.state)
            .field("scenario", &self.scenario)
            .field("incidents", &self.incidents)
            .finish()
    }
}

impl RemediationLoop {
    /// Build every agent from `config`
    pub fn new(
        config: &Config,
        memory: Arc<MemoryStore>,
        sink: Arc<dyn ActionSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            monitor: MonitorAgent::new(config.monitor.clone())?,
            analyst: AnalystAgent::new(config.analyst.clone(), memory.clone()),
            planner: PlannerAgent::new(config.planner.clone(), memory.clone()),
            executor: ExecutorAgent::new(config.executor.clone(), sink)?,
            memory,
            telemetry: None,
            reporter: None,
            scenario: None,
            state: ClusterState::default(),
            incidents: 0,
        })
    }

    /// Record metric and incident telemetry
    pub fn with_telemetry(mut self, telemetry: TelemetryLog) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Attach an incident reporter
    pub fn with_reporter(mut self, reporter: Box<dyn IncidentReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Tag telemetry and memory with the injected scenario name
    pub fn with_scenario(mut self, scenario: Option<String>) -> Self {
        self.scenario = scenario;
        self
    }

    /// Start from a specific cluster state
    pub fn with_state(mut self, state: ClusterState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor.stats()
    }

    /// Monitor baseline for one metric
    pub fn window_stats(&self, key: MetricKind) -> Option<WindowStats> {
        self.monitor.window_stats(key)
    }

    /// Incidents opened so far
    pub fn incidents(&self) -> u64 {
        self.incidents
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Run one point through the loop
    pub fn tick(&mut self, point: &MetricPoint) -> Result<TickOutcome> {
        self.tick_at(point, Instant::now())
    }

    /// Run one point through the loop with an explicit executor clock
    pub fn tick_at(&mut self, point: &MetricPoint, now: Instant) -> Result<TickOutcome> {
        let started = Instant::now();
        metrics::counter!("sentinel_ticks_total").increment(1);

        if let Some(telemetry) = &self.telemetry {
            telemetry.log_metric(point, self.scenario.as_deref())?;
        }

        // 1) detect
        let anomaly = self.monitor.process(point);
        if anomaly.is_warming_up() {
            debug!(window_size = anomaly.window_size, "Monitor warming up");
            return Ok(TickOutcome::quiet(LifecycleStage::WarmingUp, anomaly));
        }
        if !anomaly.is_anomaly {
            debug!(score = anomaly.anomaly_score, "No anomaly");
            return Ok(TickOutcome::quiet(LifecycleStage::Monitoring, anomaly));
        }

        metrics::counter!("sentinel_anomalies_total").increment(1);
        self.incidents += 1;
        let incident_id = new_incident_id();
        let mut trail = vec![LifecycleStage::Monitoring];
        let abnormal: BTreeMap<String, Value> = anomaly
            .abnormal_metrics
            .iter()
            .map(|(kind, z)| (kind.as_str().to_string(), Value::from(*z)))
            .collect();

        info!(
            incident_id = %incident_id,
            score = anomaly.anomaly_score,
            reason = %anomaly.reason,
            "Anomaly detected"
        );
        self.log_incident(
            &incident_id,
            "detect",
            json!({
                "anomaly_score": anomaly.anomaly_score,
                "abnormal_metrics": anomaly.abnormal_names(),
                "reason": anomaly.reason,
                "cluster_state_before": self.state,
            }),
        )?;

        // 2) analyze
        enter(&mut trail, LifecycleStage::Analyzing, &incident_id);
        let analysis = self.analyst.analyze(&anomaly, &point.metrics);
        if let Some(top) = analysis.top() {
            self.log_incident(
                &incident_id,
                "analyze",
                json!({
                    "top_hypothesis": top.name,
                    "likelihood": top.likelihood,
                    "evidence": top.evidence,
                }),
            )?;
        }

        // 3) decide
        enter(&mut trail, LifecycleStage::Planning, &incident_id);
        let decision = self.planner.plan(&analysis);
        metrics::gauge!("sentinel_decision_confidence").set(decision.confidence);
        if decision.was_overridden() {
            metrics::counter!("sentinel_policy_escalations_total").increment(1);
        }
        self.log_incident(
            &incident_id,
            "decide",
            json!({
                "action": decision.action,
                "confidence": decision.confidence,
                "risk": decision.risk,
                "rationale": decision.rationale,
            }),
        )?;

        // 4) act
        enter(&mut trail, LifecycleStage::Executing, &incident_id);
        let result = self.executor.execute_at(&decision, &mut self.state, now);
        metrics::counter!(
            "sentinel_actions_total",
            "action" => result.action.as_str(),
            "outcome" => result.outcome.clone()
        )
        .increment(1);
        if result.is_cooldown_blocked() {
            metrics::counter!("sentinel_cooldown_blocks_total").increment(1);
        }
        self.log_incident(
            &incident_id,
            "act",
            json!({
                "action": result.action,
                "success": result.success,
                "outcome": result.outcome,
                "cluster_state_after": self.state,
            }),
        )?;

        // 5) learn
        enter(&mut trail, LifecycleStage::Learning, &incident_id);
        let signature = AnalystAgent::signature(&anomaly);
        let mut metadata = BTreeMap::new();
        metadata.insert("incident_id".to_string(), Value::String(incident_id.clone()));
        metadata.insert(
            "scenario".to_string(),
            self.scenario.clone().map_or(Value::Null, Value::String),
        );
        metadata.insert("anomaly_score".to_string(), Value::from(anomaly.anomaly_score));
        metadata.insert("abnormal_metrics".to_string(), json!(abnormal));
        metadata.insert(
            "decision".to_string(),
            json!({
                "confidence": decision.confidence,
                "risk": decision.risk,
                "rationale": decision.rationale,
            }),
        );
        metadata.insert("cluster_state_after".to_string(), serde_json::to_value(&self.state)?);

        let record = self.memory.append(
            &signature,
            result.action,
            result.success,
            &result.outcome,
            metadata,
        )?;

        let report = self
            .reporter
            .as_ref()
            .map(|reporter| reporter.generate(point, &analysis, &decision, &result));

        metrics::histogram!("sentinel_tick_seconds").record(started.elapsed().as_secs_f64());
        info!(
            incident_id = %incident_id,
            signature = %signature,
            action = %result.action,
            success = result.success,
            outcome = %result.outcome,
            "Outcome stored"
        );

        Ok(TickOutcome {
            stage: LifecycleStage::Learning,
            trail,
            anomaly,
            incident_id: Some(incident_id),
            analysis: Some(analysis),
            decision: Some(decision),
            result: Some(result),
            memory_record: Some(record),
            report,
        })
    }

    fn log_incident(&self, incident_id: &str, stage: &str, fields: Value) -> Result<()> {
        match &self.telemetry {
            Some(telemetry) => telemetry.log_incident(incident_id, stage, fields),
            None => Ok(()),
        }
    }
}

fn enter(trail: &mut Vec<LifecycleStage>, stage: LifecycleStage, incident_id: &str) {
    debug!(incident_id = %incident_id, stage = %stage, "Lifecycle stage entered");
    trail.push(stage);
}

/// Short incident id: first 8 characters of a v4 UUID
pub fn new_incident_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StubIncidentReporter;
    use ops_sentinel_core::types::{Action, Metrics};
    use ops_sentinel_storage::action_log::InMemoryActionSink;
    use std::time::Duration;

    fn point(cpu: f64, mem: f64, lat_ms: f64, err: f64) -> MetricPoint {
        let metrics = Metrics {
            cpu,
            mem,
            lat_ms,
            err,
        };
        MetricPoint::new(metrics, 2, "v1")
    }

    fn calm(i: usize) -> MetricPoint {
        let d = if i % 2 == 0 { 1.0 } else { -1.0 };
        point(40.0 + d, 40.0 + d, 120.0 + d, 1.0 + d)
    }

    fn build(dir: &tempfile::TempDir) -> (Arc<InMemoryActionSink>, RemediationLoop) {
        let memory = Arc::new(MemoryStore::open(dir.path().join("memory.jsonl")).unwrap());
        let sink = Arc::new(InMemoryActionSink::new());
        let pipeline = RemediationLoop::new(&Config::default(), memory, sink.clone()).unwrap();
        (sink, pipeline)
    }

    #[test]
    fn test_incident_id_is_short_hex() {
        let id = new_incident_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_quiet_ticks_do_not_touch_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, mut pipeline) = build(&dir);

        let first = pipeline.tick(&calm(0)).unwrap();
        assert_eq!(first.stage, LifecycleStage::WarmingUp);
        assert_eq!(first.trail, vec![LifecycleStage::WarmingUp]);
        for i in 1..40 {
            pipeline.tick(&calm(i)).unwrap();
        }
        let outcome = pipeline.tick(&calm(40)).unwrap();
        assert_eq!(outcome.stage, LifecycleStage::Monitoring);
        assert_eq!(outcome.trail, vec![LifecycleStage::Monitoring]);

        let cpu = pipeline.window_stats(MetricKind::Cpu).unwrap();
        assert_eq!(cpu.n, 30);
        assert!((cpu.mean - 40.0).abs() < 1e-9);
        assert!(!outcome.is_incident());
        assert!(sink.records().is_empty());
        assert!(pipeline.memory().records().unwrap().records.is_empty());
    }

    #[test]
    fn test_incident_runs_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, pipeline) = build(&dir);
        let mut pipeline = pipeline.with_reporter(Box::new(StubIncidentReporter));
        for i in 0..30 {
            pipeline.tick(&calm(i)).unwrap();
        }

        let outcome = pipeline.tick(&point(95.0, 40.0, 120.0, 1.0)).unwrap();
        assert_eq!(outcome.stage, LifecycleStage::Learning);
        assert_eq!(
            outcome.trail,
            vec![
                LifecycleStage::Monitoring,
                LifecycleStage::Analyzing,
                LifecycleStage::Planning,
                LifecycleStage::Executing,
                LifecycleStage::Learning,
            ]
        );
        assert!(outcome.is_incident());
        assert_eq!(outcome.result.as_ref().unwrap().action, Action::Escalate);
        assert_eq!(outcome.report.as_ref().unwrap().title, "Incident: cpu_saturation");

        let record = outcome.memory_record.unwrap();
        assert_eq!(record.signature, "cpu:pos");
        assert_eq!(record.metadata["incident_id"], json!(outcome.incident_id.unwrap()));
        assert_eq!(record.metadata["cluster_state_after"]["replicas"], json!(2));
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_cooldown_block_is_learned_as_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (_sink, mut pipeline) = build(&dir);
        for i in 0..30 {
            pipeline.tick(&calm(i)).unwrap();
        }

        let t0 = Instant::now();
        pipeline.tick_at(&point(95.0, 40.0, 120.0, 1.0), t0).unwrap();
        let second = pipeline
            .tick_at(&point(95.0, 40.0, 120.0, 1.0), t0 + Duration::from_secs(1))
            .unwrap();

        let result = second.result.unwrap();
        assert!(result.is_cooldown_blocked());
        let record = second.memory_record.unwrap();
        assert_eq!(record.action, Action::Noop);
        assert!(!record.success);
        assert_eq!(record.outcome, "cooldown_active");
    }

    #[test]
    fn test_telemetry_records_incident_stages() {
        let dir = tempfile::tempdir().unwrap();
        let (_sink, pipeline) = build(&dir);
        let telemetry = TelemetryLog::open(
            dir.path().join("logs/metrics.jsonl"),
            dir.path().join("logs/incidents.jsonl"),
        )
        .unwrap();
        let mut pipeline = pipeline
            .with_telemetry(telemetry)
            .with_scenario(Some("cpu_spike".to_string()));

        for i in 0..30 {
            pipeline.tick(&calm(i)).unwrap();
        }
        pipeline.tick(&point(95.0, 40.0, 120.0, 1.0)).unwrap();

        let metrics: ops_sentinel_storage::jsonl::Scan<Value> =
            ops_sentinel_storage::jsonl::scan(dir.path().join("logs/metrics.jsonl"), 1000).unwrap();
        assert_eq!(metrics.records.len(), 31);
        assert_eq!(metrics.records[0]["scenario"], json!("cpu_spike"));

        let incidents_path = dir.path().join("logs/incidents.jsonl");
        let incidents: ops_sentinel_storage::jsonl::Scan<Value> =
            ops_sentinel_storage::jsonl::scan(incidents_path, 1000).unwrap();
        let stages: Vec<&str> = incidents
            .records
            .iter()
            .filter_map(|r| r["stage"].as_str())
            .collect();
        assert_eq!(stages, vec!["detect", "analyze", "decide", "act"]);
        assert_eq!(incidents.records[0]["abnormal_metrics"], json!(["cpu"]));
    }
}
