//! # Metric Sources
//!
//! A source produces the next metric snapshot on demand. Sources that model
//! the managed system (the simulator) read the current [`ClusterState`] so
//! executor actions feed back into the metrics; recorded sources ignore it.

pub mod replay;
pub mod simulator;

pub use replay::JsonlReplaySource;
pub use simulator::{FailureInjector, Scenario, Simulator};

use ops_sentinel_core::types::{ClusterState, MetricPoint};
use ops_sentinel_core::Result;

/// Common trait for all metric sources
pub trait MetricSource: Send {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Produce the next point, or `None` once the source is exhausted
    fn next_point(&mut self, state: &ClusterState) -> Option<Result<MetricPoint>>;

    /// Failure scenario being injected, if any
    fn scenario(&self) -> Option<&str> {
        None
    }
}
