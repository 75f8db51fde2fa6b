//! # Sentinel Detection
//!
//! The closed remediation loop: detection, diagnosis, planning, execution
//! and learning over a stream of metric points.
//!
//! This crate provides:
//! - Rolling-window statistics
//! - The monitor, analyst, planner and executor agents
//! - [`RemediationLoop`], which runs one point through every stage
//! - Incident reporting and offline replay of recorded metrics

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod agents;
pub mod pipeline;
pub mod replay;
pub mod report;
pub mod stats;

pub use pipeline::{RemediationLoop, TickOutcome};
pub use replay::{replay_monitor, ReplayRun, ReplaySummary};
pub use report::{build_reporter, IncidentReporter, StubIncidentReporter};
pub use stats::{RollingWindow, WindowStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::{AnalystAgent, ExecutorAgent, MonitorAgent, MonitorStats, PlannerAgent};
    pub use crate::pipeline::{RemediationLoop, TickOutcome};
    pub use crate::replay::{replay_monitor, ReplayRun, ReplaySummary};
    pub use crate::report::{build_reporter, IncidentReporter, StubIncidentReporter};
    pub use crate::stats::{RollingWindow, WindowStats};
}
