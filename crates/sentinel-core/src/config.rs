//! Configuration for the remediation loop.
//!
//! Loaded from YAML; every section falls back to its defaults when omitted.
//!
//! ```yaml
//! monitor:
//!   window_size: 30
//!   z_threshold: 3.0
//! planner:
//!   auto_confidence_threshold: 0.75
//! executor:
//!   cooldown_seconds: 10
//! reporting:
//!   enabled: true
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Smallest rolling window the monitor accepts
pub const MIN_WINDOW_SIZE: usize = 5;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub analyst: AnalystConfig,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub storage: StorageConfig,
    pub reporting: ReportingConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        self.analyst.validate()?;
        self.planner.validate()?;
        self.executor.validate()?;
        Ok(())
    }
}

/// Monitor (detection) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples per metric in the rolling window (>= 5)
    pub window_size: usize,
    /// |z| at or above which a metric counts as abnormal
    pub z_threshold: f64,
    /// Minimum anomaly score for a positive verdict
    pub score_threshold: f64,
    /// Minimum number of abnormal metrics for a positive verdict
    pub min_abnormal_metrics: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            z_threshold: 3.0,
            score_threshold: 3.5,
            min_abnormal_metrics: 1,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(Error::config(format!(
                "window_size must be >= {}, got {}",
                MIN_WINDOW_SIZE, self.window_size
            )));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(Error::config("z_threshold must be a positive number"));
        }
        if !self.score_threshold.is_finite() {
            return Err(Error::config("score_threshold must be finite"));
        }
        Ok(())
    }
}

/// Base likelihoods used by the analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub base_cpu: f64,
    pub base_mem: f64,
    pub base_latency: f64,
    pub base_errors: f64,
    pub base_unknown: f64,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            base_cpu: 0.55,
            base_mem: 0.55,
            base_latency: 0.50,
            base_errors: 0.60,
            base_unknown: 0.25,
        }
    }
}

impl AnalystConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base_cpu", self.base_cpu),
            ("base_mem", self.base_mem),
            ("base_latency", self.base_latency),
            ("base_errors", self.base_errors),
            ("base_unknown", self.base_unknown),
        ] {
            check_unit_interval(name, value)?;
        }
        Ok(())
    }
}

/// Policy gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minimum confidence for autonomous action
    pub auto_confidence_threshold: f64,
    /// Maximum risk for autonomous action
    pub auto_risk_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            auto_confidence_threshold: 0.75,
            auto_risk_threshold: 0.35,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("auto_confidence_threshold", self.auto_confidence_threshold)?;
        check_unit_interval("auto_risk_threshold", self.auto_risk_threshold)
    }
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Minimum interval between two executed actions
    pub cooldown_seconds: f64,
    /// Version label a rollback restores
    pub rollback_version: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 10.0,
            rollback_version: "v0".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.cooldown_seconds.is_finite() && self.cooldown_seconds >= 0.0) {
            return Err(Error::config("cooldown_seconds must be a non-negative number"));
        }
        self.cooldown()?;
        if self.rollback_version.is_empty() {
            return Err(Error::config("rollback_version must not be empty"));
        }
        Ok(())
    }

    /// Cooldown as a [`Duration`]; fails when it doesn't fit one
    pub fn cooldown(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.cooldown_seconds).map_err(|e| {
            Error::config(format!(
                "cooldown_seconds {} is out of range: {}",
                self.cooldown_seconds, e
            ))
        })
    }
}

/// Incident report generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Attach a report to every remediated incident
    pub enabled: bool,
    pub provider: ReportProvider,
}

/// Backend that renders incident reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportProvider {
    /// Template-based, no external calls
    #[default]
    Stub,
}

/// Locations of the durable logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub memory_path: PathBuf,
    pub actions_path: PathBuf,
    pub metrics_path: PathBuf,
    pub incidents_path: PathBuf,
    /// Maximum memory-log lines indexed for bias queries
    pub memory_scan_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_path: PathBuf::from("memory/aiops_memory.jsonl"),
            actions_path: PathBuf::from("logs/actions.jsonl"),
            metrics_path: PathBuf::from("logs/metrics.jsonl"),
            incidents_path: PathBuf::from("logs/incidents.jsonl"),
            memory_scan_limit: 5000,
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::config(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )));
    }
    Ok(())
}
