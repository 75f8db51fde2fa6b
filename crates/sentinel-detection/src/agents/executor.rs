//! Executor Agent
//!
//! Applies planned actions to the owned [`ClusterState`] behind a cooldown.
//!
//! While the cooldown is active every decision is answered with
//! `action=noop, success=false, outcome=cooldown_active` and nothing changes,
//! including the cooldown timer itself. Cooldown refusals are an expected
//! outcome, not an error.

use chrono::Utc;
use ops_sentinel_core::config::ExecutorConfig;
use ops_sentinel_core::types::{Action, ActionResult, ClusterState, PlanDecision, COOLDOWN_ACTIVE};
use ops_sentinel_core::Result;
use ops_sentinel_storage::action_log::{ActionLogRecord, ActionSink};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Action log event name
pub const EXECUTE_EVENT: &str = "execute";

/// Cluster-state mutator
pub struct ExecutorAgent {
    config: ExecutorConfig,
    cooldown: Duration,
    sink: Arc<dyn ActionSink>,
    last_action: Option<Instant>,
}

impl std::fmt::Debug for ExecutorAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorAgent")
            .field("config", &self.config)
            .field("last_action", &self.last_action)
            .finish()
    }
}

impl ExecutorAgent {
    pub fn new(config: ExecutorConfig, sink: Arc<dyn ActionSink>) -> Result<Self> {
        config.validate()?;
        info!(
            cooldown_seconds = config.cooldown_seconds,
            rollback_version = %config.rollback_version,
            "Creating Executor Agent"
        );
        Ok(Self {
            cooldown: config.cooldown()?,
            config,
            sink,
            last_action: None,
        })
    }

    /// Execute `decision` now
    pub fn execute(&mut self, decision: &PlanDecision, state: &mut ClusterState) -> ActionResult {
        self.execute_at(decision, state, Instant::now())
    }

    /// Execute `decision` as of `now`
    pub fn execute_at(
        &mut self,
        decision: &PlanDecision,
        state: &mut ClusterState,
        now: Instant,
    ) -> ActionResult {
        if let Some(remaining) = self.cooldown_remaining(now) {
            warn!(
                action = %decision.action,
                remaining_ms = remaining.as_millis() as u64,
                "Cooldown active, action skipped"
            );
            return ActionResult {
                ts: Utc::now(),
                action: Action::Noop,
                success: false,
                outcome: COOLDOWN_ACTIVE.to_string(),
                changed: BTreeMap::new(),
            };
        }

        let mut changed = BTreeMap::new();
        let outcome = match decision.action {
            Action::Scale => {
                state.replicas = state.replicas.saturating_add(1);
                changed.insert("replicas".to_string(), Value::from(state.replicas));
                "scaled_up"
            }
            Action::Rollback => {
                state.version = self.config.rollback_version.clone();
                changed.insert("version".to_string(), Value::String(state.version.clone()));
                "rollback_complete"
            }
            Action::Restart => "service_restarted",
            Action::Escalate => "incident_escalated",
            Action::Noop => "noop",
        };
        self.last_action = Some(now);

        let record = ActionLogRecord::new(
            EXECUTE_EVENT,
            json!({
                "action": decision.action,
                "outcome": outcome,
                "cluster_state": state,
            }),
        );
        if let Err(e) = self.sink.record(&record) {
            error!(action = %decision.action, error = %e, "Failed to record action");
        }

        info!(
            action = %decision.action,
            outcome,
            replicas = state.replicas,
            version = %state.version,
            "Action executed"
        );

        ActionResult {
            ts: Utc::now(),
            action: decision.action,
            success: true,
            outcome: outcome.to_string(),
            changed,
        }
    }

    /// Time left on the cooldown as of `now`, if any
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_action?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_sentinel_storage::action_log::InMemoryActionSink;

    fn decision(action: Action) -> PlanDecision {
        PlanDecision {
            ts: Utc::now(),
            action,
            confidence: 0.9,
            risk: 0.2,
            rationale: "test".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn executor(cooldown_seconds: f64) -> (Arc<InMemoryActionSink>, ExecutorAgent) {
        let sink = Arc::new(InMemoryActionSink::new());
        let config = ExecutorConfig {
            cooldown_seconds,
            ..ExecutorConfig::default()
        };
        let agent = ExecutorAgent::new(config, sink.clone()).unwrap();
        (sink, agent)
    }

    #[test]
    fn test_scale_adds_replica() {
        let (sink, mut agent) = executor(10.0);
        let mut state = ClusterState::default();
        let result = agent.execute(&decision(Action::Scale), &mut state);

        assert!(result.success);
        assert_eq!(result.outcome, "scaled_up");
        assert_eq!(state.replicas, 3);
        assert_eq!(result.changed["replicas"], json!(3));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "execute");
        assert_eq!(records[0].payload["cluster_state"]["replicas"], json!(3));
    }

    #[test]
    fn test_rollback_sets_baseline_version() {
        let (_sink, mut agent) = executor(0.0);
        let mut state = ClusterState {
            version: "v3".to_string(),
            ..ClusterState::default()
        };
        let result = agent.execute(&decision(Action::Rollback), &mut state);
        assert_eq!(result.outcome, "rollback_complete");
        assert_eq!(state.version, "v0");
        assert_eq!(result.changed["version"], json!("v0"));
    }

    #[test]
    fn test_non_mutating_actions() {
        let (_sink, mut agent) = executor(0.0);
        let mut state = ClusterState::default();
        for (action, outcome) in [
            (Action::Restart, "service_restarted"),
            (Action::Escalate, "incident_escalated"),
            (Action::Noop, "noop"),
        ] {
            let result = agent.execute(&decision(action), &mut state);
            assert!(result.success);
            assert_eq!(result.action, action);
            assert_eq!(result.outcome, outcome);
            assert!(result.changed.is_empty());
        }
        assert_eq!(state, ClusterState::default());
    }

    #[test]
    fn test_cooldown_blocks_second_action() {
        let (sink, mut agent) = executor(10.0);
        let mut state = ClusterState::default();
        let t0 = Instant::now();

        agent.execute_at(&decision(Action::Scale), &mut state, t0);
        let later = t0 + Duration::from_secs(1);
        let blocked = agent.execute_at(&decision(Action::Scale), &mut state, later);

        assert!(blocked.is_cooldown_blocked());
        assert_eq!(blocked.action, Action::Noop);
        assert_eq!(state.replicas, 3);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_blocked_attempt_does_not_extend_cooldown() {
        let (_sink, mut agent) = executor(10.0);
        let mut state = ClusterState::default();
        let t0 = Instant::now();

        agent.execute_at(&decision(Action::Scale), &mut state, t0);
        agent.execute_at(&decision(Action::Scale), &mut state, t0 + Duration::from_secs(9));
        let expired = t0 + Duration::from_secs(10);
        let result = agent.execute_at(&decision(Action::Scale), &mut state, expired);

        assert!(result.success);
        assert_eq!(state.replicas, 4);
    }

    #[test]
    fn test_cooldown_remaining() {
        let (_sink, mut agent) = executor(10.0);
        let t0 = Instant::now();
        assert!(agent.cooldown_remaining(t0).is_none());
        agent.execute_at(&decision(Action::Escalate), &mut ClusterState::default(), t0);
        assert_eq!(
            agent.cooldown_remaining(t0 + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
    }

    #[test]
    fn test_huge_cooldown_fails_construction() {
        let config = ExecutorConfig {
            cooldown_seconds: 1e20,
            ..ExecutorConfig::default()
        };
        let err = ExecutorAgent::new(config, Arc::new(InMemoryActionSink::new())).unwrap_err();
        assert!(err.is_config());
    }
}
