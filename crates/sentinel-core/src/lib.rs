//! # Sentinel Core
//!
//! Shared building blocks for the ops-sentinel remediation loop.
//!
//! This crate provides:
//! - Value types exchanged between pipeline stages
//! - YAML configuration with validation
//! - The workspace-wide error type

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        AnalystConfig, Config, ExecutorConfig, MonitorConfig, PlannerConfig, ReportProvider,
        ReportingConfig, StorageConfig,
    };
    pub use crate::types::{
        clamp01, Action, ActionResult, AnalysisReport, AnomalyReport, ClusterState, Hypothesis,
        HypothesisKind, IncidentReport, LifecycleStage, MemoryRecord, MetricKind, MetricPoint,
        Metrics, PlanDecision,
    };
    pub use crate::{Error, Result};
}
