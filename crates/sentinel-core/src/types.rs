//! Value types passed between pipeline stages.
//!
//! Every type here is an immutable snapshot once it leaves the stage that
//! built it. The only mutable state object is [`ClusterState`], which is
//! owned by the loop and handed to the executor by `&mut` once per tick.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Clamp a likelihood, confidence or risk value into `[0, 1]`.
///
/// NaN collapses to `0.0`.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Serde adapter storing timestamps as float seconds since the Unix epoch.
///
/// All JSONL logs use this shape for `ts`.
pub mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_f64(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_f64(secs).ok_or_else(|| de::Error::custom(format!("timestamp out of range: {secs}")))
    }

    /// Convert a timestamp to float epoch seconds
    pub fn to_f64(ts: &DateTime<Utc>) -> f64 {
        ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9
    }

    /// Convert float epoch seconds to a timestamp
    pub fn from_f64(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(whole as i64, nanos)
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// The fixed set of metrics carried by every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// CPU utilisation (percent)
    Cpu,
    /// Memory utilisation (percent)
    Mem,
    /// Request latency in milliseconds
    LatMs,
    /// Error count per tick
    Err,
}

impl MetricKind {
    /// All metric kinds in canonical order
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Mem,
        MetricKind::LatMs,
        MetricKind::Err,
    ];

    /// Wire name of the metric
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Mem => "mem",
            MetricKind::LatMs => "lat_ms",
            MetricKind::Err => "err",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::validation(format!("Unknown metric: {}", s)))
    }
}

/// One sample of every tracked metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu: f64,
    pub mem: f64,
    pub lat_ms: f64,
    pub err: f64,
}

impl Metrics {
    /// Value of a single metric
    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Mem => self.mem,
            MetricKind::LatMs => self.lat_ms,
            MetricKind::Err => self.err,
        }
    }

    /// Iterate over `(kind, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, f64)> + '_ {
        MetricKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

/// Immutable metric snapshot produced once per tick by an external source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub replicas: u32,
    pub version: String,
}

impl MetricPoint {
    /// Create a point stamped with the current time
    pub fn new(metrics: Metrics, replicas: u32, version: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            metrics,
            replicas,
            version: version.into(),
        }
    }

    /// Parse a flat JSON record (`{ts, cpu, mem, lat_ms, err, replicas, version}`).
    ///
    /// Every metric field is required: a missing or non-numeric metric yields
    /// [`Error::MissingMetric`]. `ts` defaults to now, `replicas` to 0 and
    /// `version` to the empty string.
    pub fn from_json(record: &Value) -> Result<Self> {
        let obj = record
            .as_object()
            .ok_or_else(|| Error::validation("metric record must be a JSON object"))?;

        let metric = |kind: MetricKind| -> Result<f64> {
            obj.get(kind.as_str())
                .and_then(Value::as_f64)
                .ok_or_else(|| Error::MissingMetric(kind.as_str().to_string()))
        };

        let metrics = Metrics {
            cpu: metric(MetricKind::Cpu)?,
            mem: metric(MetricKind::Mem)?,
            lat_ms: metric(MetricKind::LatMs)?,
            err: metric(MetricKind::Err)?,
        };

        let ts = match obj.get("ts") {
            None | Some(Value::Null) => Utc::now(),
            Some(v) => v
                .as_f64()
                .and_then(epoch_seconds::from_f64)
                .ok_or_else(|| Error::validation(format!("invalid ts: {}", v)))?,
        };

        let replicas = obj
            .get("replicas")
            .and_then(Value::as_u64)
            .map(|r| u32::try_from(r).unwrap_or(u32::MAX))
            .unwrap_or(0);

        let version = obj
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            ts,
            metrics,
            replicas,
            version,
        })
    }
}

// =============================================================================
// MONITOR OUTPUT
// =============================================================================

/// Reason tag for reports produced before the window is full
pub const WARMING_UP: &str = "warming_up";

/// Verdict produced by the monitor for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    /// Signed z-score of every metric at or above the z threshold
    pub abnormal_metrics: BTreeMap<MetricKind, f64>,
    pub window_size: usize,
    pub reason: String,
}

impl AnomalyReport {
    /// Report emitted while the rolling window is still filling
    pub fn warming_up(ts: DateTime<Utc>, window_size: usize) -> Self {
        Self {
            ts,
            is_anomaly: false,
            anomaly_score: 0.0,
            abnormal_metrics: BTreeMap::new(),
            window_size,
            reason: WARMING_UP.to_string(),
        }
    }

    /// Whether this report was produced during warm-up
    pub fn is_warming_up(&self) -> bool {
        self.reason == WARMING_UP
    }

    /// Abnormal metric names sorted alphabetically
    pub fn abnormal_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.abnormal_metrics.keys().map(MetricKind::as_str).collect();
        names.sort_unstable();
        names
    }
}

// =============================================================================
// ANALYST OUTPUT
// =============================================================================

/// Closed set of causal hypotheses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisKind {
    CpuSaturation,
    MemoryPressureOrLeak,
    NetworkLatencyOrDownstreamSlow,
    ErrorBurstOrBadDeploy,
    UnknownAnomaly,
}

impl HypothesisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HypothesisKind::CpuSaturation => "cpu_saturation",
            HypothesisKind::MemoryPressureOrLeak => "memory_pressure_or_leak",
            HypothesisKind::NetworkLatencyOrDownstreamSlow => "network_latency_or_downstream_slow",
            HypothesisKind::ErrorBurstOrBadDeploy => "error_burst_or_bad_deploy",
            HypothesisKind::UnknownAnomaly => "unknown_anomaly",
        }
    }
}

impl fmt::Display for HypothesisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked causal explanation for an anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub name: HypothesisKind,
    /// Likelihood in `[0, 1]`
    pub likelihood: f64,
    pub evidence: Vec<String>,
}

impl Hypothesis {
    pub fn new(name: HypothesisKind, likelihood: f64, evidence: impl Into<String>) -> Self {
        Self {
            name,
            likelihood: clamp01(likelihood),
            evidence: vec![evidence.into()],
        }
    }

    /// Add to the likelihood, keeping it inside `[0, 1]`
    pub fn boost(&mut self, delta: f64) {
        self.likelihood = clamp01(self.likelihood + delta);
        debug_assert!((0.0..=1.0).contains(&self.likelihood));
    }
}

/// Analyst output: the anomaly plus its ranked hypotheses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub anomaly: AnomalyReport,
    /// Sorted descending by likelihood; never empty
    pub hypotheses: Vec<Hypothesis>,
    pub summary: String,
}

impl AnalysisReport {
    /// Highest-ranked hypothesis
    pub fn top(&self) -> Option<&Hypothesis> {
        self.hypotheses.first()
    }
}

// =============================================================================
// PLANNER / EXECUTOR
// =============================================================================

/// Remediation actions understood by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Restart,
    Scale,
    Rollback,
    Escalate,
    Noop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Restart => "restart",
            Action::Scale => "scale",
            Action::Rollback => "rollback",
            Action::Escalate => "escalate",
            Action::Noop => "noop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "restart" => Ok(Action::Restart),
            "scale" => Ok(Action::Scale),
            "rollback" => Ok(Action::Rollback),
            "escalate" => Ok(Action::Escalate),
            "noop" => Ok(Action::Noop),
            _ => Err(Error::validation(format!("Unknown action: {}", s))),
        }
    }
}

/// Planner output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub action: Action,
    pub confidence: f64,
    pub risk: f64,
    pub rationale: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl PlanDecision {
    /// Action the planner wanted before the policy gate overrode it
    pub fn proposed_action(&self) -> Option<Action> {
        self.metadata
            .get("proposed_action")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Whether the policy gate forced escalation
    pub fn was_overridden(&self) -> bool {
        self.metadata.contains_key("proposed_action")
    }
}

/// Executor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub action: Action,
    pub success: bool,
    pub outcome: String,
    #[serde(default)]
    pub changed: BTreeMap<String, Value>,
}

/// Outcome tag returned when the executor cooldown blocks an action
pub const COOLDOWN_ACTIVE: &str = "cooldown_active";

impl ActionResult {
    /// Whether the executor refused to act because of the cooldown
    pub fn is_cooldown_blocked(&self) -> bool {
        !self.success && self.outcome == COOLDOWN_ACTIVE
    }
}

/// Mutable view of the managed cluster.
///
/// Only the executor writes to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub replicas: u32,
    pub version: String,
    pub service_health: String,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            replicas: 2,
            version: "v1".to_string(),
            service_health: "ok".to_string(),
        }
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// One line of the memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub signature: String,
    pub action: Action,
    pub success: bool,
    pub outcome: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

// =============================================================================
// LIFECYCLE & REPORTING
// =============================================================================

/// Stage of the incident lifecycle reached by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    WarmingUp,
    Monitoring,
    Analyzing,
    Planning,
    Executing,
    Learning,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::WarmingUp => "warming_up",
            LifecycleStage::Monitoring => "monitoring",
            LifecycleStage::Analyzing => "analyzing",
            LifecycleStage::Planning => "planning",
            LifecycleStage::Executing => "executing",
            LifecycleStage::Learning => "learning",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable incident summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    #[serde(with = "epoch_seconds")]
    pub ts: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub timeline: Vec<String>,
    pub metrics: BTreeMap<String, Value>,
    pub action_taken: Value,
    pub outcome: Value,
}
