//! Engine orchestration -- assembly, lifecycle, and shutdown.
//!
//! The [`Orchestrator`] is the central coordinator of `logroute-daemon`.
//! It validates configuration, builds the [`RouterEngine`] from the label
//! definitions, starts it, runs the optional stdin forwarder, and stops
//! everything in order when a signal arrives or stdin reaches EOF.
//!
//! # Shutdown Order
//!
//! 1. Stop the forwarder (no new records)
//! 2. Stop the engine (drain intake, final flush, quarantine the rest)
//! 3. Stop background tasks (uptime, health reporting)

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use logroute_core::config::LogrouteConfig;
use logroute_core::metrics as m;
use logroute_core::pipeline::Pipeline;
use logroute_engine::{EngineConfig, RouterEngine, RouterEngineBuilder};

use crate::forwarder::{self, ForwardStats};
use crate::health::DaemonHealth;
use crate::metrics_server;

/// Interval between health reports.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogrouteConfig,
    /// The routing engine.
    engine: RouterEngine,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogrouteConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Label definitions are loaded and compiled here, so every load-time
    /// error surfaces before any record is accepted.
    pub async fn build_from_config(config: LogrouteConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let engine = build_engine(&config).await?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_daemon_metrics();
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        tracing::info!(
            labels = engine.graph().label_count(),
            pipeline_dir = %engine.config().pipeline_dir.display(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            engine,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the engine and block until shutdown.
    ///
    /// With `read_stdin`, lines from stdin are forwarded to the engine and
    /// EOF triggers a graceful shutdown like a signal does.
    pub async fn run(&mut self, read_stdin: bool) -> Result<()> {
        self.engine
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start router engine: {}", e))?;

        let mut forwarder_task = if read_stdin {
            let handle = self
                .engine
                .handle()
                .ok_or_else(|| anyhow::anyhow!("engine handle unavailable after start"))?;
            let shutdown_rx = self.shutdown_tx.subscribe();
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            Some(tokio::spawn(forwarder::forward_lines(stdin, handle, shutdown_rx)))
        } else {
            None
        };

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("entering main loop");
        let mut health_interval = tokio::time::interval(HEALTH_INTERVAL);
        health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let signal = wait_for_shutdown_signal();
        tokio::pin!(signal);

        let mut forward_stats = None;
        loop {
            tokio::select! {
                result = &mut signal => {
                    let name = result?;
                    tracing::info!(signal = name, "shutdown signal received");
                    break;
                }
                joined = async { forwarder_task.as_mut()?.await.ok() }, if forwarder_task.is_some() => {
                    forwarder_task = None;
                    forward_stats = joined;
                    tracing::info!("input closed, shutting down");
                    break;
                }
                _ = health_interval.tick() => {
                    self.health().await.log();
                }
            }
        }

        // 1. forwarder
        let _ = self.shutdown_tx.send(());
        if let Some(task) = forwarder_task.take() {
            forward_stats = task.await.ok();
        }
        if let Some(stats) = forward_stats {
            log_forward_stats(&stats);
        }

        // 2. engine
        self.shutdown().await?;

        // 3. background tasks
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        Ok(())
    }

    /// Stop the engine and log its shutdown reports.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping router engine");
        self.engine
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop router engine: {}", e))?;

        for report in self.engine.last_shutdown_reports() {
            tracing::info!(
                output = %report.output,
                flushed_chunks = report.flushed_chunks,
                quarantined_chunks = report.quarantined_chunks,
                quarantined_records = report.quarantined_records,
                "output shut down"
            );
        }

        let stats = self.engine.stats();
        tracing::info!(
            ingested = stats.ingested,
            delivered = stats.delivered,
            dropped = stats.dropped(),
            rejected = stats.rejected,
            malformed = stats.malformed,
            "logroute-daemon shut down"
        );
        Ok(())
    }

    /// Get the current aggregated health report.
    pub async fn health(&self) -> DaemonHealth {
        let uptime_secs = self.start_time.elapsed().as_secs();
        DaemonHealth::from_engine(
            self.engine.health_check().await,
            &self.engine.stats(),
            uptime_secs,
        )
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogrouteConfig {
        &self.config
    }

    /// Get a reference to the routing engine.
    pub fn engine(&self) -> &RouterEngine {
        &self.engine
    }

    /// Get a mutable reference to the routing engine.
    pub fn engine_mut(&mut self) -> &mut RouterEngine {
        &mut self.engine
    }
}

/// Build the engine from the core configuration.
///
/// Also used by `--validate` to compile label definitions without
/// starting any worker.
pub async fn build_engine(config: &LogrouteConfig) -> Result<RouterEngine> {
    let engine_config = EngineConfig::from_core(config);
    RouterEngineBuilder::new()
        .config(engine_config)
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("failed to build router engine: {}", e))
}

fn log_forward_stats(stats: &ForwardStats) {
    tracing::info!(
        lines = stats.lines,
        skipped = stats.skipped,
        delivered = stats.delivered,
        dropped = stats.dropped,
        rejected = stats.rejected,
        "forwarder finished"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uptime_updater_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = spawn_uptime_updater(Instant::now(), shutdown_rx);

        let _ = shutdown_tx.send(());

        let result = tokio::time::timeout(Duration::from_millis(100), task).await;
        assert!(result.is_ok(), "uptime updater should shut down within timeout");
    }
}
