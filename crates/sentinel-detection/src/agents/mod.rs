//! Remediation Agents
//!
//! One agent per stage of the loop:
//!
//! - **MonitorAgent**: turns metric samples into anomaly verdicts against a
//!   rolling window.
//!
//! - **AnalystAgent**: generates ranked causal hypotheses for an anomaly,
//!   biased by past outcomes.
//!
//! - **PlannerAgent**: maps the top hypothesis to an action and gates it
//!   behind the confidence/risk policy.
//!
//! - **ExecutorAgent**: applies the action to the cluster state under a
//!   cooldown and records it.
//!
//! Agents are synchronous; none of them blocks or suspends.

pub mod analyst;
pub mod executor;
pub mod monitor;
pub mod planner;

pub use analyst::AnalystAgent;
pub use executor::ExecutorAgent;
pub use monitor::{MonitorAgent, MonitorStats};
pub use planner::PlannerAgent;
