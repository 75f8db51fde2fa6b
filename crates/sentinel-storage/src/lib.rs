//! # Sentinel Storage
//!
//! Durable persistence for the remediation loop.
//!
//! This crate provides:
//! - The outcome memory that biases diagnosis and planning
//! - Write-only action log sinks
//! - Replayable metric and incident telemetry
//!
//! Everything is stored as append-only newline-delimited JSON.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod action_log;
pub mod jsonl;
pub mod memory;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action_log::{
        ActionLogRecord, ActionSink, InMemoryActionSink, JsonlActionLog, NoopActionSink,
    };
    pub use crate::memory::{MemoryStore, MemorySummary, SuccessRate};
    pub use crate::telemetry::TelemetryLog;
}
