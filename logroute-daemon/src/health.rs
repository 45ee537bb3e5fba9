//! Aggregated health reporting.
//!
//! Combines the engine's [`HealthStatus`] with the per-output sink
//! counters into a single [`DaemonHealth`] report that the orchestrator
//! logs periodically.
//!
//! # Status Rule
//!
//! - Engine not running -> Unhealthy
//! - Any output at its pending-chunk limit or with quarantined chunks -> Degraded
//! - Otherwise -> Healthy

use logroute_core::pipeline::HealthStatus;
use logroute_engine::EngineStats;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonHealth {
    /// Overall status as reported by the engine.
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Records routed to an output buffer.
    pub delivered: u64,
    /// Records dropped (filtered, unrouted, hop limit, no output).
    pub dropped: u64,
    /// Per-output sink health.
    pub outputs: Vec<OutputHealth>,
}

/// Health counters for a single output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputHealth {
    /// Output name from the label definitions.
    pub name: String,
    /// Sealed chunks waiting for acknowledgement (including in flight).
    pub pending_chunks: usize,
    /// Chunks quarantined since start.
    pub chunks_quarantined: u64,
    /// Records acknowledged by the output.
    pub records_acked: u64,
}

impl DaemonHealth {
    /// Build a report from an engine status and counter snapshot.
    pub fn from_engine(status: HealthStatus, stats: &EngineStats, uptime_secs: u64) -> Self {
        let outputs = stats
            .outputs
            .iter()
            .map(|(name, snapshot)| OutputHealth {
                name: name.clone(),
                pending_chunks: snapshot.pending_chunks,
                chunks_quarantined: snapshot.chunks_quarantined,
                records_acked: snapshot.records_acked,
            })
            .collect();

        Self {
            status,
            uptime_secs,
            delivered: stats.delivered,
            dropped: stats.dropped(),
            outputs,
        }
    }

    /// Log the report at a level matching its status.
    pub fn log(&self) {
        match &self.status {
            HealthStatus::Healthy => tracing::debug!(
                uptime_secs = self.uptime_secs,
                delivered = self.delivered,
                dropped = self.dropped,
                "daemon healthy"
            ),
            HealthStatus::Degraded(reason) => tracing::warn!(
                uptime_secs = self.uptime_secs,
                reason = %reason,
                "daemon degraded"
            ),
            HealthStatus::Unhealthy(reason) => tracing::error!(
                uptime_secs = self.uptime_secs,
                reason = %reason,
                "daemon unhealthy"
            ),
        }
        for output in &self.outputs {
            tracing::debug!(
                output = %output.name,
                pending_chunks = output.pending_chunks,
                chunks_quarantined = output.chunks_quarantined,
                records_acked = output.records_acked,
                "output health"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logroute_engine::sink::SinkStatsSnapshot;

    #[test]
    fn report_copies_per_output_counters() {
        let stats = EngineStats {
            delivered: 10,
            filtered_out: 2,
            no_route: 1,
            outputs: vec![(
                "order-app".to_owned(),
                SinkStatsSnapshot {
                    records_acked: 9,
                    pending_chunks: 1,
                    ..SinkStatsSnapshot::default()
                },
            )],
            ..EngineStats::default()
        };

        let health = DaemonHealth::from_engine(HealthStatus::Healthy, &stats, 42);
        assert_eq!(health.uptime_secs, 42);
        assert_eq!(health.delivered, 10);
        assert_eq!(health.dropped, 3);
        assert_eq!(
            health.outputs,
            vec![OutputHealth {
                name: "order-app".to_owned(),
                pending_chunks: 1,
                chunks_quarantined: 0,
                records_acked: 9,
            }]
        );
    }

    #[test]
    fn degraded_status_is_kept() {
        let health = DaemonHealth::from_engine(
            HealthStatus::Degraded("output 'x' quarantined 1 chunks".to_owned()),
            &EngineStats::default(),
            0,
        );
        assert!(!health.status.is_healthy());
        assert!(health.outputs.is_empty());
    }
}
