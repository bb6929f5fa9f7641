//! One-shot field backfill for documents written before status, tags and
//! sync fields existed. Runs locally only.

use pr_core::{Entity, EntityKind, ProjectStatus, Timestamp};
use pr_core::types::{STATUS_FIELD, TAGS_FIELD};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub projects: usize,
    pub feedback: usize
}

impl BackfillReport {
    pub fn total(&self) -> usize {
        self.projects + self.feedback
    }
}

/// Projects get `status = in_progress` and `tags = []` when missing. Every
/// entity gets `_version = 1` and `_lastModified = timestamp` (else `now`)
/// when missing.
pub fn backfill(entities: &mut [Entity], now: Timestamp) -> BackfillReport {
    let mut report = BackfillReport::default();
    for entity in entities.iter_mut() {
        let mut changed = entity.backfill_sync_fields(now);
        if entity.kind == EntityKind::Project {
            if !entity.payload.contains_key(STATUS_FIELD) {
                entity.set_field(STATUS_FIELD, json!(ProjectStatus::InProgress.to_string()));
                changed = true;
            }
            if !entity.payload.get(TAGS_FIELD).is_some_and(Value::is_array) {
                entity.set_field(TAGS_FIELD, json!([]));
                changed = true;
            }
        }
        if changed {
            match entity.kind {
                EntityKind::Project => report.projects += 1,
                EntityKind::Feedback => report.feedback += 1
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::{FeedbackBuilder, ProjectBuilder, at};

    #[test]
    fn test_backfill_fills_missing_fields() {
        let mut legacy = ProjectBuilder::new("Old").legacy().build();
        legacy.timestamp = None;
        let mut entities = vec![legacy, ProjectBuilder::new("New").build()];

        let report = backfill(&mut entities, at(900));
        assert_eq!(report.projects, 1);
        assert_eq!(entities[0].version, 1);
        assert_eq!(entities[0].last_modified, Some(at(900)));
        assert_eq!(entities[0].status(), Some(ProjectStatus::InProgress));
        assert!(entities[0].tags().is_empty());
        assert!(entities[0].payload[TAGS_FIELD].is_array());
    }

    #[test]
    fn test_backfill_prefers_creation_time() {
        let mut feedback = FeedbackBuilder::new("f1", "Foo").at(30).build();
        feedback.version = 0;
        feedback.last_modified = None;
        let mut entities = vec![feedback];

        let report = backfill(&mut entities, at(900));
        assert_eq!(report, BackfillReport { projects: 0, feedback: 1 });
        assert_eq!(entities[0].last_modified, Some(at(30)));
    }

    #[test]
    fn test_backfill_is_idempotent() {
        let mut entities = vec![ProjectBuilder::new("Old").legacy().build()];
        backfill(&mut entities, at(1));
        let snapshot = entities.clone();
        assert_eq!(backfill(&mut entities, at(2)).total(), 0);
        assert_eq!(entities, snapshot);
    }
}
