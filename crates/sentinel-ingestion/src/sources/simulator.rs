//! # Metric Simulator
//!
//! Generates cpu, mem, lat_ms and err once per tick as a bounded random walk
//! around fixed baselines, then layers on:
//!
//! - an optional failure scenario ([`FailureInjector`])
//! - the effect of extra replicas (lower cpu and errors)
//! - a short burst of latency and errors while the service is restarting
//!
//! Failure and cluster effects are applied to the emitted sample only; the
//! walk itself always continues from the undisturbed baseline.

use super::MetricSource;
use ops_sentinel_core::types::{ClusterState, MetricPoint, Metrics};
use ops_sentinel_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Baseline cpu utilisation (percent)
const BASE_CPU: f64 = 35.0;
/// Baseline memory utilisation (percent)
const BASE_MEM: f64 = 40.0;
/// Baseline latency (ms)
const BASE_LAT_MS: f64 = 120.0;
/// Baseline errors per tick
const BASE_ERR: f64 = 1.0;

/// cpu reduction per replica beyond the first
const CPU_PER_REPLICA: f64 = 1.5;
/// Error reduction per replica beyond the first
const ERR_PER_REPLICA: f64 = 0.2;

/// Health value that triggers restart instability
pub const RESTARTING: &str = "restarting";

// =============================================================================
// SCENARIOS
// =============================================================================

/// Failure scenarios the injector can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// +45±5 cpu for ticks 20..=40
    CpuSpike,
    /// mem grows by 2 per tick from tick 15, capped at +60
    MemoryLeak,
    /// +20±3 errors for ticks 25..=35
    ErrorBurst,
    /// +250±20 ms latency for ticks 18..=45
    NetworkLatency,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::CpuSpike,
        Scenario::MemoryLeak,
        Scenario::ErrorBurst,
        Scenario::NetworkLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::CpuSpike => "cpu_spike",
            Scenario::MemoryLeak => "memory_leak",
            Scenario::ErrorBurst => "error_burst",
            Scenario::NetworkLatency => "network_latency",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!(
                    "Unknown scenario: {} (expected one of cpu_spike, memory_leak, error_burst, network_latency)",
                    s
                ))
            })
    }
}

/// Tick-indexed failure injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureInjector {
    scenario: Option<Scenario>,
    t: u64,
}

impl FailureInjector {
    pub fn new(scenario: Option<Scenario>) -> Self {
        Self { scenario, t: 0 }
    }

    /// Advance to the next tick
    pub fn step(&mut self) {
        self.t += 1;
    }

    /// Ticks since start
    pub fn tick(&self) -> u64 {
        self.t
    }

    pub fn scenario(&self) -> Option<Scenario> {
        self.scenario
    }

    /// Apply the scenario for the current tick
    pub fn apply<R: Rng + ?Sized>(&self, mut metrics: Metrics, rng: &mut R) -> Metrics {
        let t = self.t;
        match self.scenario {
            Some(Scenario::CpuSpike) if (20..=40).contains(&t) => {
                metrics.cpu += 45.0 + rng.gen_range(-5.0..=5.0);
            }
            Some(Scenario::MemoryLeak) if t >= 15 => {
                metrics.mem += (2.0 * (t - 15) as f64).min(60.0);
            }
            Some(Scenario::ErrorBurst) if (25..=35).contains(&t) => {
                metrics.err += 20.0 + rng.gen_range(-3.0..=3.0);
            }
            Some(Scenario::NetworkLatency) if (18..=45).contains(&t) => {
                metrics.lat_ms += 250.0 + rng.gen_range(-20.0..=20.0);
            }
            _ => {}
        }
        metrics
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// Synthetic metric source
pub struct Simulator {
    injector: FailureInjector,
    rng: StdRng,
    baseline: Metrics,
    /// Set once restart instability has played out for the current restart
    restart_settled: bool,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("injector", &self.injector)
            .field("baseline", &self.baseline)
            .field("restart_settled", &self.restart_settled)
            .finish()
    }
}

impl Simulator {
    /// Create a simulator seeded from OS entropy
    pub fn new(scenario: Option<Scenario>) -> Self {
        Self::with_rng(scenario, StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn seeded(scenario: Option<Scenario>, seed: u64) -> Self {
        Self::with_rng(scenario, StdRng::seed_from_u64(seed))
    }

    fn with_rng(scenario: Option<Scenario>, rng: StdRng) -> Self {
        info!(
            scenario = scenario.map(|s| s.as_str()).unwrap_or("none"),
            "Creating metric simulator"
        );
        Self {
            injector: FailureInjector::new(scenario),
            rng,
            baseline: Metrics {
                cpu: BASE_CPU,
                mem: BASE_MEM,
                lat_ms: BASE_LAT_MS,
                err: BASE_ERR,
            },
            restart_settled: false,
        }
    }

    /// Ticks produced so far
    pub fn ticks(&self) -> u64 {
        self.injector.tick()
    }

    /// Produce the next sample for the given cluster state
    pub fn tick(&mut self, state: &ClusterState) -> MetricPoint {
        self.injector.step();
        let t = self.injector.tick();

        let rng = &mut self.rng;
        let base = &mut self.baseline;
        base.cpu = (base.cpu + rng.gen_range(-2.0..=2.0)).clamp(0.0, 100.0);
        base.mem = (base.mem + rng.gen_range(-1.5..=1.5)).clamp(0.0, 100.0);
        base.lat_ms = (base.lat_ms + rng.gen_range(-5.0..=5.0)).max(1.0);
        base.err = (base.err + rng.gen_range(-0.4..=0.4)).max(0.0);

        let mut metrics = self.injector.apply(self.baseline, &mut self.rng);

        if state.replicas > 1 {
            let extra = f64::from(state.replicas - 1);
            metrics.cpu = (metrics.cpu - extra * CPU_PER_REPLICA).max(0.0);
            metrics.err = (metrics.err - extra * ERR_PER_REPLICA).max(0.0);
        }

        if state.service_health == RESTARTING {
            if !self.restart_settled {
                metrics.lat_ms += 40.0;
                metrics.err += 1.0;
                if t % 3 == 0 {
                    self.restart_settled = true;
                }
            }
        } else {
            self.restart_settled = false;
        }

        metrics.cpu = metrics.cpu.clamp(0.0, 100.0);
        metrics.mem = metrics.mem.clamp(0.0, 100.0);

        debug!(
            t,
            cpu = metrics.cpu,
            mem = metrics.mem,
            lat_ms = metrics.lat_ms,
            err = metrics.err,
            "Simulated tick"
        );

        MetricPoint::new(metrics, state.replicas, state.version.clone())
    }
}

impl MetricSource for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn next_point(&mut self, state: &ClusterState) -> Option<Result<MetricPoint>> {
        Some(Ok(self.tick(state)))
    }

    fn scenario(&self) -> Option<&str> {
        self.injector.scenario().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeros() -> Metrics {
        Metrics {
            cpu: 0.0,
            mem: 0.0,
            lat_ms: 0.0,
            err: 0.0,
        }
    }

    fn injector_at(scenario: Scenario, t: u64) -> FailureInjector {
        let mut injector = FailureInjector::new(Some(scenario));
        for _ in 0..t {
            injector.step();
        }
        injector
    }

    #[test]
    fn test_scenario_parse() {
        assert_eq!("cpu_spike".parse::<Scenario>().unwrap(), Scenario::CpuSpike);
        assert_eq!("network_latency".parse::<Scenario>().unwrap(), Scenario::NetworkLatency);
        assert!("disk_full".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_cpu_spike_window() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(injector_at(Scenario::CpuSpike, 19).apply(zeros(), &mut rng).cpu, 0.0);

        let spiked = injector_at(Scenario::CpuSpike, 20).apply(zeros(), &mut rng);
        assert!((40.0..=50.0).contains(&spiked.cpu));
        assert_eq!(spiked.mem, 0.0);

        assert_eq!(injector_at(Scenario::CpuSpike, 41).apply(zeros(), &mut rng).cpu, 0.0);
    }

    #[test]
    fn test_memory_leak_grows_then_caps() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(injector_at(Scenario::MemoryLeak, 15).apply(zeros(), &mut rng).mem, 0.0);
        assert_eq!(injector_at(Scenario::MemoryLeak, 25).apply(zeros(), &mut rng).mem, 20.0);
        assert_eq!(injector_at(Scenario::MemoryLeak, 200).apply(zeros(), &mut rng).mem, 60.0);
    }

    #[test]
    fn test_error_burst_and_latency_windows() {
        let mut rng = StdRng::seed_from_u64(7);
        let burst = injector_at(Scenario::ErrorBurst, 30).apply(zeros(), &mut rng);
        assert!((17.0..=23.0).contains(&burst.err));

        let slow = injector_at(Scenario::NetworkLatency, 18).apply(zeros(), &mut rng);
        assert!((230.0..=270.0).contains(&slow.lat_ms));
        assert_eq!(injector_at(Scenario::NetworkLatency, 46).apply(zeros(), &mut rng).lat_ms, 0.0);
    }

    #[test]
    fn test_seeded_simulators_agree() {
        let state = ClusterState::default();
        let mut a = Simulator::seeded(Some(Scenario::CpuSpike), 42);
        let mut b = Simulator::seeded(Some(Scenario::CpuSpike), 42);
        for _ in 0..50 {
            assert_eq!(a.tick(&state).metrics, b.tick(&state).metrics);
        }
    }

    #[test]
    fn test_replicas_lower_cpu() {
        let two = ClusterState::default();
        let four = ClusterState {
            replicas: 4,
            ..ClusterState::default()
        };

        let cpu_two = Simulator::seeded(None, 3).tick(&two).metrics.cpu;
        let cpu_four = Simulator::seeded(None, 3).tick(&four).metrics.cpu;
        assert!((cpu_two - cpu_four - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_restart_instability_settles() {
        let ok = ClusterState::default();
        let restarting = ClusterState {
            service_health: RESTARTING.to_string(),
            ..ClusterState::default()
        };

        let mut calm = Simulator::seeded(None, 11);
        let mut unstable = Simulator::seeded(None, 11);
        let mut deltas = Vec::new();
        for _ in 0..4 {
            let a = calm.tick(&ok).metrics;
            let b = unstable.tick(&restarting).metrics;
            deltas.push(b.lat_ms - a.lat_ms);
        }
        // ticks 1..=3 disturbed, tick 4 settled
        assert!(deltas[..3].iter().all(|d| (d - 40.0).abs() < 1e-9));
        assert!(deltas[3].abs() < 1e-9);
    }

    #[test]
    fn test_point_carries_cluster_state() {
        let state = ClusterState {
            replicas: 5,
            version: "v7".to_string(),
            ..ClusterState::default()
        };
        let mut sim = Simulator::seeded(None, 1);
        let point = sim.next_point(&state).unwrap().unwrap();
        assert_eq!(point.replicas, 5);
        assert_eq!(point.version, "v7");
        assert_eq!(sim.name(), "simulator");
        assert!(sim.scenario().is_none());
    }
}
