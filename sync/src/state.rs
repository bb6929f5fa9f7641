use pr_core::Timestamp;
use serde::Serialize;

use crate::merge::MergeReport;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub pulls: u64,
    pub pulls_deferred: u64,
    pub pulls_skipped_fresh: u64,
    pub pulls_failed: u64,
    pub pushes: u64,
    pub pushes_failed: u64,
    pub entities_written: u64,
    pub live_deliveries: u64,
    pub last_pull_at: Option<Timestamp>,
    pub last_push_at: Option<Timestamp>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullMode {
    /// Background refresh, skipped while the last pull is still fresh.
    Silent,
    /// User-initiated, always fetches.
    Forced
}

/// Where the state after a cold load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Remote,
    LocalMirror
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub projects: MergeReport,
    pub feedback: MergeReport,
    pub tasks_updated: usize,
    pub notes_updated: usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    Applied(PullSummary),
    /// A push held the sync gate.
    Deferred,
    SkippedFresh,
    /// The remote was unreachable. Local state is unchanged.
    Failed
}

impl PullOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed { written: usize },
    /// Retries ran out. The next mutation or timer tries again.
    Failed
}

impl PushOutcome {
    pub fn written(&self) -> usize {
        match self {
            Self::Pushed { written } => *written,
            Self::Failed => 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_stats_serialization() {
        let stats = SyncStats {
            pushes: 2,
            ..SyncStats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["pushes"], 2);
        assert!(json["lastPullAt"].is_null());
    }

    #[test]
    fn test_outcome_helpers() {
        assert_eq!(PushOutcome::Pushed { written: 3 }.written(), 3);
        assert_eq!(PushOutcome::Failed.written(), 0);
        assert!(PullOutcome::Applied(PullSummary::default()).is_applied());
        assert!(!PullOutcome::Deferred.is_applied());
    }
}
