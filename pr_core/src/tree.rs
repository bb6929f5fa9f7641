//! Whole-tree snapshot of the hosted store.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{Collection, Entity, EntityKind, NoteDoc, TaskList};

/// `{projects, feedback, tasks, notes}`, each keyed by sanitized natural key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteTree {
    pub projects: BTreeMap<String, Entity>,
    pub feedback: BTreeMap<String, Entity>,
    pub tasks: BTreeMap<String, TaskList>,
    pub notes: BTreeMap<String, NoteDoc>
}

impl RemoteTree {
    /// Decodes a snapshot without ever failing: malformed documents are
    /// skipped or defaulted.
    pub fn from_json(root: &Value) -> Self {
        let mut tree = Self::default();
        let Some(root) = root.as_object() else {
            if !root.is_null() {
                warn!("Remote tree root is not an object, treating as empty");
            }
            return tree;
        };

        if let Some(value) = root.get(Collection::Projects.as_str()) {
            tree.projects = decode_entities(value, EntityKind::Project);
        }
        if let Some(value) = root.get(Collection::Feedback.as_str()) {
            tree.feedback = decode_entities(value, EntityKind::Feedback);
        }
        if let Some(value) = root.get(Collection::Tasks.as_str()) {
            tree.tasks = decode_tasks(value);
        }
        if let Some(value) = root.get(Collection::Notes.as_str()) {
            tree.notes = decode_notes(value);
        }
        tree
    }

    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            Collection::Projects.as_str().to_string(),
            entities_to_json(&self.projects)
        );
        root.insert(
            Collection::Feedback.as_str().to_string(),
            entities_to_json(&self.feedback)
        );
        root.insert(
            Collection::Tasks.as_str().to_string(),
            serde_json::to_value(&self.tasks).unwrap_or(Value::Null)
        );
        root.insert(
            Collection::Notes.as_str().to_string(),
            serde_json::to_value(&self.notes).unwrap_or(Value::Null)
        );
        Value::Object(root)
    }

    pub fn entities(&self, kind: EntityKind) -> &BTreeMap<String, Entity> {
        match kind {
            EntityKind::Project => &self.projects,
            EntityKind::Feedback => &self.feedback
        }
    }

    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, Entity> {
        match kind {
            EntityKind::Project => &mut self.projects,
            EntityKind::Feedback => &mut self.feedback
        }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.feedback.is_empty()
            && self.tasks.is_empty()
            && self.notes.is_empty()
    }
}

fn entities_to_json(entities: &BTreeMap<String, Entity>) -> Value {
    Value::Object(
        entities
            .iter()
            .map(|(key, entity)| (key.clone(), entity.to_json()))
            .collect()
    )
}

/// The hosted store returns collections with integer-like keys as arrays,
/// with `null` holes for missing indices.
fn collection_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Collection is not an object: {}", other);
            Vec::new()
        }
    }
}

fn decode_entities(value: &Value, kind: EntityKind) -> BTreeMap<String, Entity> {
    let mut out = BTreeMap::new();
    for (key, doc) in collection_entries(value) {
        let Some(obj) = doc.as_object() else {
            warn!(collection = %kind.collection(), key = %key, "Skipping non-object document");
            continue;
        };
        let mut obj = obj.clone();
        obj.entry("type")
            .or_insert_with(|| Value::String(kind.to_string()));
        let has_id = obj.get("id").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        if !has_id {
            obj.insert("id".to_string(), Value::String(key.clone()));
        }
        match serde_json::from_value::<Entity>(Value::Object(obj)) {
            Ok(entity) if entity.kind == kind => {
                out.insert(key, entity);
            }
            Ok(entity) => {
                warn!(
                    collection = %kind.collection(),
                    key = %key,
                    found = %entity.kind,
                    "Skipping document of the wrong kind"
                );
            }
            Err(err) => {
                warn!(collection = %kind.collection(), key = %key, error = %err, "Skipping malformed document");
            }
        }
    }
    out
}

fn decode_tasks(value: &Value) -> BTreeMap<String, TaskList> {
    let mut out = BTreeMap::new();
    for (key, doc) in collection_entries(value) {
        let decoded = match doc {
            // Older writers stored the bare list.
            Value::Array(_) => serde_json::from_value(doc.clone()).map(|tasks| TaskList {
                tasks,
                last_modified: None
            }),
            _ => serde_json::from_value::<TaskList>(doc.clone())
        };
        match decoded {
            Ok(list) => {
                out.insert(key, list);
            }
            Err(err) => warn!(key = %key, error = %err, "Skipping malformed task list")
        }
    }
    out
}

fn decode_notes(value: &Value) -> BTreeMap<String, NoteDoc> {
    let mut out = BTreeMap::new();
    for (key, doc) in collection_entries(value) {
        let decoded = match doc {
            Value::String(content) => Ok(NoteDoc {
                content: Some(content.clone()),
                last_modified: None
            }),
            _ => serde_json::from_value::<NoteDoc>(doc.clone())
        };
        match decoded {
            Ok(note) => {
                out.insert(key, note);
            }
            Err(err) => warn!(key = %key, error = %err, "Skipping malformed note")
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_root_is_empty() {
        assert!(RemoteTree::from_json(&Value::Null).is_empty());
        assert!(RemoteTree::from_json(&json!("garbage")).is_empty());
    }

    #[test]
    fn test_missing_type_and_id_are_filled() {
        let tree = RemoteTree::from_json(&json!({
            "projects": {
                "Foo": {"projectName": "Foo", "_version": 2}
            },
            "feedback": {
                "f_1": {"feedbackText": "ok"}
            }
        }));

        let foo = &tree.projects["Foo"];
        assert_eq!(foo.kind, EntityKind::Project);
        assert_eq!(foo.id, "Foo");
        assert_eq!(foo.version, 2);

        let fb = &tree.feedback["f_1"];
        assert_eq!(fb.kind, EntityKind::Feedback);
        assert_eq!(fb.id, "f_1");
    }

    #[test]
    fn test_non_object_documents_are_skipped() {
        let tree = RemoteTree::from_json(&json!({
            "projects": {"Bad": 42, "Good": {"projectName": "Good"}}
        }));
        assert_eq!(tree.projects.len(), 1);
        assert!(tree.projects.contains_key("Good"));
    }

    #[test]
    fn test_array_collections_skip_holes() {
        let tree = RemoteTree::from_json(&json!({
            "feedback": [null, {"id": "x", "type": "feedback"}]
        }));
        assert_eq!(tree.feedback.len(), 1);
        assert_eq!(tree.feedback["1"].id, "x");
    }

    #[test]
    fn test_tasks_and_notes_shapes() {
        let tree = RemoteTree::from_json(&json!({
            "tasks": {
                "Foo": {"tasks": [{"text": "a", "assignee": "Ash", "completed": false}]},
                "Bar": [{"text": "b"}]
            },
            "notes": {
                "Foo": {"content": "hello"},
                "Bar": "plain"
            }
        }));

        assert_eq!(tree.tasks["Foo"].tasks[0].assignee, "Ash");
        assert_eq!(tree.tasks["Bar"].tasks[0].text, "b");
        assert_eq!(tree.notes["Foo"].content.as_deref(), Some("hello"));
        assert_eq!(tree.notes["Bar"].content.as_deref(), Some("plain"));
    }

    #[test]
    fn test_to_json_roundtrips() {
        let tree = RemoteTree::from_json(&json!({
            "projects": {"Foo": {"id": "p1", "type": "project", "projectName": "Foo", "_version": 1}},
            "notes": {"Foo": {"content": "n"}}
        }));
        assert_eq!(RemoteTree::from_json(&tree.to_json()), tree);
    }
}
