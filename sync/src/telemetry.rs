use std::time::Instant;

use config::ObservabilityConfig;
use metrics::{counter, gauge, histogram};
use pr_core::Collection;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::state::PullOutcome;
use crate::store::PersistOutcome;

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level. Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging_level.as_str()));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}

#[derive(Debug, Clone, Copy)]
pub struct SyncTelemetry {
    enabled: bool
}

impl Default for SyncTelemetry {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SyncTelemetry {
    pub fn new(config: &ObservabilityConfig) -> Self {
        Self {
            enabled: config.metrics_enabled
        }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_pull(&self, outcome: &PullOutcome) {
        if !self.enabled {
            return;
        }
        let label = match outcome {
            PullOutcome::Applied(_) => "applied",
            PullOutcome::Deferred => "deferred",
            PullOutcome::SkippedFresh => "skipped_fresh",
            PullOutcome::Failed => "failed"
        };
        counter!("review_sync_pulls_total", "outcome" => label).increment(1);
        if let PullOutcome::Applied(summary) = outcome {
            counter!("review_sync_conflicts_total")
                .increment((summary.projects.conflicts() + summary.feedback.conflicts()) as u64);
        }
    }

    pub fn record_push(&self, written: usize, started: Instant) {
        if !self.enabled {
            return;
        }
        counter!("review_sync_pushes_total", "outcome" => "pushed").increment(1);
        counter!("review_sync_entities_written_total").increment(written as u64);
        histogram!("review_sync_push_duration_ms").record(started.elapsed().as_millis() as f64);
    }

    pub fn record_push_failure(&self) {
        if self.enabled {
            counter!("review_sync_pushes_total", "outcome" => "failed").increment(1);
        }
    }

    pub fn record_persist(&self, outcome: PersistOutcome) {
        if !self.enabled {
            return;
        }
        let label = match outcome {
            PersistOutcome::Written => "written",
            PersistOutcome::WrittenAfterEviction => "evicted",
            PersistOutcome::Dropped => "dropped"
        };
        counter!("review_mirror_persists_total", "outcome" => label).increment(1);
    }

    pub fn record_live_delivery(&self, collection: Collection) {
        if self.enabled {
            counter!("review_live_deliveries_total", "collection" => collection.as_str())
                .increment(1);
        }
    }

    pub fn set_live_projects(&self, count: usize) {
        if self.enabled {
            gauge!("review_live_projects").set(count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PullSummary;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        let telemetry = SyncTelemetry::default();
        telemetry.record_pull(&PullOutcome::Applied(PullSummary::default()));
        telemetry.record_push(2, Instant::now());
        telemetry.record_push_failure();
        telemetry.record_persist(PersistOutcome::Dropped);
        telemetry.record_live_delivery(Collection::Notes);
        telemetry.set_live_projects(3);
    }

    #[test]
    fn test_telemetry_follows_config() {
        let config = ObservabilityConfig {
            metrics_enabled: false,
            ..ObservabilityConfig::default()
        };
        assert!(!SyncTelemetry::new(&config).is_enabled());
        assert!(SyncTelemetry::default().is_enabled());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = ObservabilityConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
