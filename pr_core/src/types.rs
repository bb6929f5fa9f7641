//! Core types for the project review system

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::time::{self, Timestamp};

pub const PROJECT_NAME_FIELD: &str = "projectName";
pub const STATUS_FIELD: &str = "status";
pub const TAGS_FIELD: &str = "tags";
pub const IMAGES_FIELD: &str = "images";

/// Discriminator of a mergeable entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Project,
    Feedback
}

impl EntityKind {
    pub fn collection(self) -> Collection {
        match self {
            Self::Project => Collection::Projects,
            Self::Feedback => Collection::Feedback
        }
    }
}

/// Top-level collections of the hosted document tree.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
    Projects,
    Feedback,
    Tasks,
    Notes
}

impl Collection {
    pub const ALL: [Collection; 4] = [Self::Projects, Self::Feedback, Self::Tasks, Self::Notes];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Feedback => "feedback",
            Self::Tasks => "tasks",
            Self::Notes => "notes"
        }
    }

    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Self::Projects => Some(EntityKind::Project),
            Self::Feedback => Some(EntityKind::Feedback),
            Self::Tasks | Self::Notes => None
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    InProgress,
    Completed,
    Archived
}

impl ProjectStatus {
    pub const ORDER: [ProjectStatus; 3] = [Self::InProgress, Self::Completed, Self::Archived];

    pub fn label(self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Archived => "Archived"
        }
    }
}

/// A project or feedback record subject to merge.
///
/// Only `id`, the natural key, `version`, `last_modified` and `deleted_at`
/// are interpreted by the merge engine. Everything else lives in `payload`
/// and round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// Creation time.
    #[serde(default, with = "time::lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    #[serde(
        rename = "_version",
        default,
        deserialize_with = "time::version::deserialize"
    )]
    pub version: u64,

    #[serde(
        rename = "_lastModified",
        default,
        with = "time::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<Timestamp>,

    #[serde(
        rename = "_deletedAt",
        default,
        with = "time::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<Timestamp>,

    #[serde(flatten)]
    pub payload: Map<String, Value>
}

impl Entity {
    /// Creates a fresh entity at `version = 1` stamped with `now`.
    pub fn new(kind: EntityKind, id: String, payload: Map<String, Value>, now: Timestamp) -> Self {
        Self {
            id,
            kind,
            timestamp: Some(now),
            version: 1,
            last_modified: Some(now),
            deleted_at: None,
            payload
        }
    }

    /// Project name for projects, own id for feedback. A project missing its
    /// name falls back to its id.
    pub fn natural_key(&self) -> &str {
        match self.kind {
            EntityKind::Project => self.project_name().unwrap_or(&self.id),
            EntityKind::Feedback => &self.id
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// `last_modified`, else creation time, else the epoch.
    pub fn effective_last_modified(&self) -> Timestamp {
        self.last_modified
            .or(self.timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Records a synced mutation.
    pub fn touch(&mut self, now: Timestamp) {
        self.version = self.version.saturating_add(1);
        self.last_modified = Some(now);
    }

    /// Soft delete: the record stays and carries the deletion to other writers.
    pub fn tombstone(&mut self, now: Timestamp) {
        self.deleted_at = Some(now);
        self.touch(now);
    }

    /// Ensures `version >= 1` and `last_modified` is set. Returns whether
    /// anything changed.
    pub fn backfill_sync_fields(&mut self, fallback: Timestamp) -> bool {
        let mut changed = false;
        if self.version == 0 {
            self.version = 1;
            changed = true;
        }
        if self.last_modified.is_none() {
            self.last_modified = Some(self.timestamp.unwrap_or(fallback));
            changed = true;
        }
        changed
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.payload.insert(name.to_string(), value);
    }

    pub fn project_name(&self) -> Option<&str> {
        self.str_field(PROJECT_NAME_FIELD)
    }

    pub fn status(&self) -> Option<ProjectStatus> {
        self.str_field(STATUS_FIELD).and_then(|s| s.parse().ok())
    }

    pub fn tags(&self) -> Vec<&str> {
        self.payload
            .get(TAGS_FIELD)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn images(&self) -> &[Value] {
        self.payload
            .get(IMAGES_FIELD)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_images(&mut self, images: Vec<Value>) {
        self.set_field(IMAGES_FIELD, Value::Array(images));
    }

    pub fn try_to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Infallible view for hashing and comparison. Never write the result
    /// to a remote: use [`Entity::try_to_json`] there.
    pub fn to_json(&self) -> Value {
        self.try_to_json().unwrap_or_else(|err| {
            tracing::error!(id = %self.id, error = %err, "Entity failed to serialize");
            Value::Null
        })
    }
}

/// Image attached to a project. Stored inline as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, with = "time::lenient", skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<Timestamp>,
    #[serde(default)]
    pub filename: String
}

/// Typed payload of a project submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFields {
    pub project_name: String,
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub attachments: String
}

/// Typed payload of a feedback submission. The rating fields are kept for
/// documents written by older forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackFields {
    pub project_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub feedback_text: String,
    #[serde(default)]
    pub usefulness: Option<Value>,
    #[serde(default)]
    pub would_use: Option<Value>,
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default)]
    pub why_useful: Option<Value>,
    #[serde(default)]
    pub why_not_useful: Option<Value>
}

pub(crate) fn into_payload<T: Serialize>(fields: &T) -> Map<String, Value> {
    match serde_json::to_value(fields) {
        Ok(Value::Object(map)) => map,
        _ => Map::new()
    }
}

impl ProjectFields {
    pub fn into_payload(self) -> Map<String, Value> {
        into_payload(&self)
    }
}

impl FeedbackFields {
    pub fn into_payload(self) -> Map<String, Value> {
        into_payload(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub text: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "time::lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>
}

/// Remote record `tasks/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(
        rename = "_lastModified",
        default,
        with = "time::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<Timestamp>
}

/// Remote record `notes/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NoteDoc {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(
        rename = "_lastModified",
        default,
        with = "time::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<Timestamp>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Feedback,
    Task,
    Deleted
}

/// Local audit record. Never synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    #[serde(with = "time::required")]
    pub timestamp: Timestamp,
    pub author: String,
    pub action_type: ChangeAction,
    pub description: String
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_entity_wire_shape() {
        let mut payload = Map::new();
        payload.insert("projectName".to_string(), json!("Foo"));
        let entity = Entity::new(EntityKind::Project, "p-1".to_string(), payload, at(100));

        let value = entity.to_json();
        assert_eq!(value["type"], "project");
        assert_eq!(value["_version"], 1);
        assert_eq!(value["projectName"], "Foo");
        assert!(value.get("_deletedAt").is_none());

        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_wire_document_is_never_null() {
        let entity = Entity::new(EntityKind::Feedback, "f-1".to_string(), Map::new(), at(5));
        let doc = entity.try_to_json().unwrap();
        assert!(doc.is_object());
        assert_eq!(doc, entity.to_json());
    }

    #[test]
    fn test_entity_decodes_with_missing_sync_fields() {
        let entity: Entity = serde_json::from_value(json!({
            "type": "feedback",
            "id": "f-1",
            "feedbackText": "nice",
            "_lastModified": "not a date"
        }))
        .unwrap();

        assert_eq!(entity.version, 0);
        assert!(entity.last_modified.is_none());
        assert_eq!(entity.natural_key(), "f-1");
        assert_eq!(entity.str_field("feedbackText"), Some("nice"));
    }

    #[test]
    fn test_version_accepts_float_and_string() {
        let a: Entity =
            serde_json::from_value(json!({"type": "project", "_version": 3.0})).unwrap();
        let b: Entity =
            serde_json::from_value(json!({"type": "project", "_version": "4"})).unwrap();
        assert_eq!(a.version, 3);
        assert_eq!(b.version, 4);
    }

    #[test]
    fn test_natural_key_falls_back_to_id() {
        let entity = Entity::new(EntityKind::Project, "p-9".to_string(), Map::new(), at(1));
        assert_eq!(entity.natural_key(), "p-9");
    }

    #[test]
    fn test_touch_and_tombstone() {
        let mut entity = Entity::new(EntityKind::Project, "p".to_string(), Map::new(), at(1));
        entity.touch(at(5));
        assert_eq!(entity.version, 2);
        assert_eq!(entity.last_modified, Some(at(5)));

        entity.tombstone(at(9));
        assert!(!entity.is_live());
        assert_eq!(entity.version, 3);
        assert_eq!(entity.deleted_at, Some(at(9)));
        assert_eq!(entity.effective_last_modified(), at(9));
    }

    #[test]
    fn test_backfill_prefers_creation_time() {
        let mut entity: Entity =
            serde_json::from_value(json!({"type": "project", "timestamp": "2024-01-01T00:00:00.000Z"}))
                .unwrap();
        assert!(entity.backfill_sync_fields(at(999)));
        assert_eq!(entity.version, 1);
        assert_eq!(entity.last_modified, entity.timestamp);
        assert!(!entity.backfill_sync_fields(at(999)));
    }

    #[test]
    fn test_project_fields_payload() {
        let payload = ProjectFields {
            project_name: "Foo".to_string(),
            status: ProjectStatus::Completed,
            tags: vec!["ml".to_string()],
            ..Default::default()
        }
        .into_payload();

        let entity = Entity::new(EntityKind::Project, "p".to_string(), payload, at(1));
        assert_eq!(entity.project_name(), Some("Foo"));
        assert_eq!(entity.status(), Some(ProjectStatus::Completed));
        assert_eq!(entity.tags(), vec!["ml"]);
        assert!(entity.images().is_empty());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ProjectStatus::InProgress.to_string(), "in_progress");
        assert_eq!("archived".parse::<ProjectStatus>().unwrap(), ProjectStatus::Archived);
        assert_eq!(ProjectStatus::Completed.label(), "Completed");
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Tasks.as_str(), "tasks");
        assert_eq!(Collection::Projects.to_string(), "projects");
        assert_eq!(Collection::Feedback.entity_kind(), Some(EntityKind::Feedback));
        assert_eq!(Collection::Notes.entity_kind(), None);
    }

    #[test]
    fn test_change_log_entry_shape() {
        let entry = ChangeLogEntry {
            timestamp: at(10),
            author: "Ash".to_string(),
            action_type: ChangeAction::Task,
            description: "Added task".to_string()
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["actionType"], "task");
        assert_eq!(value["timestamp"], "1970-01-01T00:00:10.000Z");
    }
}
