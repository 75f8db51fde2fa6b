//! # Sentinel Ingestion
//!
//! Metric sources that feed the remediation loop one [`MetricPoint`] per tick.
//!
//! - [`Simulator`]: random-walk baseline with optional failure-scenario injection
//! - [`JsonlReplaySource`]: replays a previously recorded `metrics.jsonl`
//!
//! [`MetricPoint`]: ops_sentinel_core::types::MetricPoint

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod sources;

pub use sources::{FailureInjector, JsonlReplaySource, MetricSource, Scenario, Simulator};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::sources::{FailureInjector, JsonlReplaySource, MetricSource, Scenario, Simulator};
}
