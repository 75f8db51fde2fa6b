//! Ops-Sentinel Main Binary
//!
//! Runs the closed remediation loop and its offline tooling:
//! - `run`: drive the loop from the metric simulator
//! - `replay`: re-run detection over a recorded `metrics.jsonl`
//! - `memory`: inspect what the loop has learned so far

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ops_sentinel_core::config::Config;
use ops_sentinel_core::types::{MetricKind, MetricPoint};
use ops_sentinel_detection::prelude::*;
use ops_sentinel_ingestion::prelude::*;
use ops_sentinel_storage::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{signal, time::MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ops-Sentinel CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "ops-sentinel", version, about = "Closed-loop anomaly detection and remediation")]
struct Cli {
    /// Configuration file path (YAML); defaults apply when omitted
    #[clap(short, long, env = "SENTINEL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "SENTINEL_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "SENTINEL_LOG_JSON", global = true)]
    log_json: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the remediation loop against the metric simulator
    Run {
        /// Inject a failure scenario (cpu_spike, memory_leak, error_burst, network_latency)
        #[clap(long)]
        scenario: Option<Scenario>,

        /// Seconds between ticks
        #[clap(long, default_value_t = 1.0)]
        interval: f64,

        /// Override the monitor rolling window size
        #[clap(long)]
        window: Option<usize>,

        /// Stop after this many ticks
        #[clap(long)]
        ticks: Option<u64>,

        /// Seed the simulator for a reproducible run
        #[clap(long)]
        seed: Option<u64>,

        /// Don't write action or telemetry logs
        #[clap(long)]
        dry_run: bool,
    },
    /// Replay a recorded metrics.jsonl through the monitor
    Replay {
        /// Path to metrics.jsonl
        #[clap(long, default_value = "logs/metrics.jsonl")]
        path: PathBuf,

        /// Monitor window size for replay
        #[clap(long)]
        window: Option<usize>,

        /// z_threshold for replay
        #[clap(long)]
        z: Option<f64>,

        /// score_threshold for replay
        #[clap(long)]
        score: Option<f64>,

        /// min_abnormal_metrics for replay
        #[clap(long)]
        min_abnormal: Option<usize>,

        /// Seconds to pause between replayed points (0 = as fast as possible)
        #[clap(long, default_value_t = 0.0)]
        sleep: f64,

        /// Output the summary as JSON
        #[clap(long)]
        json: bool,
    },
    /// Show learned success rates from the memory log
    Memory {
        /// Only show rows for this signature
        #[clap(long)]
        signature: Option<String>,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli)?;

    info!("Starting Ops-Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            scenario,
            interval,
            window,
            ticks,
            seed,
            dry_run,
        } => run_loop_command(config, scenario, interval, window, ticks, seed, dry_run).await,
        Commands::Replay {
            path,
            window,
            z,
            score,
            min_abnormal,
            sleep,
            json,
        } => {
            let mut config = config;
            if let Some(window) = window {
                config.monitor.window_size = window;
            }
            if let Some(z) = z {
                config.monitor.z_threshold = z;
            }
            if let Some(score) = score {
                config.monitor.score_threshold = score;
            }
            if let Some(min_abnormal) = min_abnormal {
                config.monitor.min_abnormal_metrics = min_abnormal;
            }
            run_replay_command(&config, &path, sleep, json).await
        }
        Commands::Memory { signature, json } => {
            run_memory_command(&config, signature.as_deref(), json)
        }
    }
}

/// Load the configuration file, or defaults when none was given
fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            let config = Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Run the remediation loop until the source ends, `ticks` is reached or a
/// shutdown signal arrives
async fn run_loop_command(
    mut config: Config,
    scenario: Option<Scenario>,
    interval: f64,
    window: Option<usize>,
    ticks: Option<u64>,
    seed: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let period = seconds_arg("--interval", interval)?;
    if period.is_zero() {
        anyhow::bail!("--interval must be a positive number of seconds, got {}", interval);
    }
    if let Some(window) = window {
        config.monitor.window_size = window;
    }
    config.validate().context("Invalid configuration")?;

    let memory = Arc::new(
        MemoryStore::open_with_limit(&config.storage.memory_path, config.storage.memory_scan_limit)
            .context("Failed to open memory store")?,
    );

    let sink: Arc<dyn ActionSink> = if dry_run {
        Arc::new(NoopActionSink)
    } else {
        Arc::new(
            JsonlActionLog::open(&config.storage.actions_path)
                .context("Failed to open action log")?,
        )
    };

    let mut source = match seed {
        Some(seed) => Simulator::seeded(scenario, seed),
        None => Simulator::new(scenario),
    };

    let mut pipeline = RemediationLoop::new(&config, memory.clone(), sink)
        .context("Failed to build remediation loop")?
        .with_scenario(scenario.map(|s| s.to_string()));
    if let Some(reporter) = build_reporter(&config.reporting) {
        pipeline = pipeline.with_reporter(reporter);
    }
    if !dry_run {
        let telemetry =
            TelemetryLog::open(&config.storage.metrics_path, &config.storage.incidents_path)
                .context("Failed to open telemetry logs")?;
        pipeline = pipeline.with_telemetry(telemetry);
    }

    info!(
        source = source.name(),
        scenario = source.scenario().unwrap_or("none"),
        interval_secs = interval,
        window_size = config.monitor.window_size,
        dry_run,
        "Starting remediation loop"
    );

    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Shutdown is only observed between ticks so an in-flight tick, including
    // its memory append, always completes.
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut completed: u64 = 0;
    loop {
        if ticks.is_some_and(|max| completed >= max) {
            info!(ticks = completed, "Tick limit reached");
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = timer.tick() => {}
        }

        let point = match source.next_point(pipeline.state()) {
            Some(point) => point.context("Metric source failed")?,
            None => {
                info!(source = source.name(), "Metric source exhausted");
                break;
            }
        };

        let outcome = pipeline.tick(&point).context("Tick failed")?;
        print_tick(&point, &outcome);
        completed += 1;
    }

    if let Err(e) = memory.sync() {
        error!(error = %e, "Failed to sync memory store");
    }

    let stats = pipeline.monitor_stats();
    println!("\n{}", "=".repeat(70));
    println!("LOOP SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Ticks:       {}", completed);
    println!("Evaluated:   {}", stats.evaluated);
    println!("Anomalies:   {}", stats.anomalies);
    println!("Incidents:   {}", pipeline.incidents());
    println!(
        "State:       replicas={} version={} health={}",
        pipeline.state().replicas,
        pipeline.state().version,
        pipeline.state().service_health
    );
    for kind in MetricKind::ALL {
        if let Some(baseline) = pipeline.window_stats(kind) {
            println!(
                "Baseline:    {:<7} mean={:.2} std={:.2} n={}",
                kind.as_str(),
                baseline.mean,
                baseline.std_dev,
                baseline.n
            );
        }
    }
    println!("{}", "=".repeat(70));

    info!("Ops-Sentinel shut down gracefully");
    Ok(())
}

/// Print one tick in the console format
fn print_tick(point: &MetricPoint, outcome: &TickOutcome) {
    let m = &point.metrics;
    println!(
        "CPU={:.0}  MEM={:.0}  LAT(ms)={:.0}  ERR={:.0}  replicas={}  version={}",
        m.cpu, m.mem, m.lat_ms, m.err, point.replicas, point.version
    );

    let anomaly = &outcome.anomaly;
    if anomaly.is_warming_up() {
        println!("[MONITOR] warming up...");
    } else {
        println!(
            "[MONITOR] anomaly={} score={:.2} abnormal={:?} reason={}",
            anomaly.is_anomaly,
            anomaly.anomaly_score,
            anomaly.abnormal_names(),
            anomaly.reason
        );
    }

    if let (Some(id), Some(analysis), Some(decision), Some(result)) = (
        &outcome.incident_id,
        &outcome.analysis,
        &outcome.decision,
        &outcome.result,
    ) {
        println!("[INCIDENT] id={}", id);
        println!("[ANALYST] {}", analysis.summary);
        if let Some(top) = analysis.top() {
            println!(
                "[ANALYST] top={} likelihood={:.2} evidence={:?}",
                top.name, top.likelihood, top.evidence
            );
        }
        println!(
            "[PLANNER] action={} confidence={:.2} risk={:.2} rationale={}",
            decision.action, decision.confidence, decision.risk, decision.rationale
        );
        println!(
            "[EXECUTOR] action={} success={} outcome={}",
            result.action, result.success, result.outcome
        );
        if let Some(record) = &outcome.memory_record {
            println!(
                "[MEMORY] stored signature={} action={} success={}",
                record.signature, record.action, record.success
            );
        }
        if let Some(report) = &outcome.report {
            println!("[REPORT] {}: {}", report.title, report.summary);
        }
    }
    println!("{}", "-".repeat(70));
}

/// Replay recorded metrics through a fresh monitor
async fn run_replay_command(
    config: &Config,
    path: &Path,
    sleep: f64,
    json_output: bool,
) -> Result<()> {
    let pause = seconds_arg("--sleep", sleep)?;
    config.monitor.validate().context("Invalid monitor configuration")?;

    let points: Vec<MetricPoint> = JsonlReplaySource::open(path)
        .context("Failed to open metrics file")?
        .collect::<ops_sentinel_core::Result<_>>()
        .context("Failed to read metrics file")?;

    let run = replay_monitor(points.iter().cloned(), &config.monitor).context("Replay failed")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&run.summary)?);
        return Ok(());
    }

    for (point, report) in points.iter().zip(&run.reports) {
        if report.is_anomaly {
            let m = &point.metrics;
            println!(
                "[REPLAY] anomaly=true score={:.2} abnormal={:?} cpu={:.1} mem={:.1} lat={:.1} err={:.1}",
                report.anomaly_score,
                report.abnormal_names(),
                m.cpu,
                m.mem,
                m.lat_ms,
                m.err
            );
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    println!(
        "Replay done. total_points={} anomalies={}",
        run.summary.total_points, run.summary.anomalies
    );
    Ok(())
}

/// Parse a non-negative seconds flag
fn seconds_arg(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| {
        format!("{} must be a non-negative number of seconds, got {}", flag, value)
    })
}

/// Print the learned success rates
fn run_memory_command(config: &Config, signature: Option<&str>, json_output: bool) -> Result<()> {
    let memory =
        MemoryStore::open_with_limit(&config.storage.memory_path, config.storage.memory_scan_limit)
            .context("Failed to open memory store")?;

    let rows: Vec<MemorySummary> = memory
        .summary()
        .into_iter()
        .filter(|row| signature.map_or(true, |sig| row.signature == sig))
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(70));
    println!("MEMORY ({})", memory.path().display());
    println!("{}", "=".repeat(70));
    if rows.is_empty() {
        println!("  (no outcomes recorded yet)");
    } else {
        println!(
            "{:<32} {:<10} {:>9} {:>7} {:>7}",
            "Signature", "Action", "Successes", "Total", "Rate"
        );
        println!("{}", "-".repeat(70));
        for row in &rows {
            println!(
                "{:<32} {:<10} {:>9} {:>7} {:>7.2}",
                row.signature, row.action.as_str(), row.successes, row.total, row.rate
            );
        }
    }
    println!("{}", "=".repeat(70));
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or CTRL+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down..."); },
        _ = terminate => { info!("Received SIGTERM, shutting down..."); },
    }
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    if cli.log_json {
        // JSON structured logging
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        // Human-readable logging, kept off stdout so console output stays clean
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "ops-sentinel",
            "run",
            "--scenario",
            "cpu_spike",
            "--interval",
            "0.5",
            "--ticks",
            "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                scenario,
                interval,
                ticks,
                ..
            } => {
                assert_eq!(scenario, Some(Scenario::CpuSpike));
                assert_eq!(interval, 0.5);
                assert_eq!(ticks, Some(10));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_seconds_arg_rejects_unrepresentable_values() {
        assert_eq!(seconds_arg("--sleep", 0.25).unwrap(), Duration::from_millis(250));
        assert!(seconds_arg("--interval", -1.0).is_err());
        assert!(seconds_arg("--interval", f64::NAN).is_err());
        assert!(seconds_arg("--interval", 1e30).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_scenario() {
        assert!(Cli::try_parse_from(["ops-sentinel", "run", "--scenario", "disk_full"]).is_err());
    }

    #[test]
    fn test_cli_parses_replay_overrides() {
        let cli = Cli::try_parse_from([
            "ops-sentinel",
            "replay",
            "--path",
            "m.jsonl",
            "--window",
            "20",
            "--min-abnormal",
            "2",
            "--sleep",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                path,
                window,
                min_abnormal,
                z,
                sleep,
                ..
            } => {
                assert_eq!(path, PathBuf::from("m.jsonl"));
                assert_eq!(sleep, 0.5);
                assert_eq!(window, Some(20));
                assert_eq!(min_abnormal, Some(2));
                assert!(z.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
