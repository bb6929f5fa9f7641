//! In-process entity store with a durable local mirror.
//!
//! The mirror holds five documents: entities (tombstones included), tasks,
//! notes, the image cache and the change log. Loading never fails; a missing
//! or corrupt document reads as empty.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use pr_core::{Entity, EntityKind, LocalMirror, Task};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::change_log::ChangeLog;
use crate::error::Result;
use crate::image_cache::ImageCache;

pub const DATA_DOC: &str = "projectReviewData";
pub const TASKS_DOC: &str = "projectTasks";
pub const NOTES_DOC: &str = "projectNotes";
pub const IMAGES_DOC: &str = "projectImageCache";
pub const CHANGE_LOG_DOC: &str = "projectChangesLog";

pub const MIRROR_DOCS: [&str; 5] = [DATA_DOC, TASKS_DOC, NOTES_DOC, IMAGES_DOC, CHANGE_LOG_DOC];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    Written,
    /// A quota failure was cleared by evicting cached images of non-live
    /// projects.
    WrittenAfterEviction,
    /// At least one document could not be written. Memory still holds it.
    Dropped
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub projects: usize,
    pub feedback: usize,
    pub skipped: usize,
    pub tasks: usize,
    pub notes: usize
}

pub struct EntityStore {
    mirror: Arc<dyn LocalMirror>,
    projects: Vec<Entity>,
    feedback: Vec<Entity>,
    tasks: BTreeMap<String, Vec<Task>>,
    notes: BTreeMap<String, String>,
    images: ImageCache,
    change_log: ChangeLog
}

impl EntityStore {
    pub fn new(mirror: Arc<dyn LocalMirror>, change_log_cap: usize) -> Self {
        Self {
            mirror,
            projects: Vec::new(),
            feedback: Vec::new(),
            tasks: BTreeMap::new(),
            notes: BTreeMap::new(),
            images: ImageCache::new(),
            change_log: ChangeLog::new(change_log_cap)
        }
    }

    /// Replaces memory with the mirror contents.
    pub fn load(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        self.projects.clear();
        self.feedback.clear();

        let docs: Vec<Value> = self.read_doc(DATA_DOC).unwrap_or_default();
        for doc in docs {
            match serde_json::from_value::<Entity>(doc) {
                Ok(entity) => self.entities_vec_mut(entity.kind).push(entity),
                Err(err) => {
                    report.skipped += 1;
                    debug!(error = %err, "Skipping unreadable mirrored entity");
                }
            }
        }

        self.tasks = self.read_doc(TASKS_DOC).unwrap_or_default();
        self.notes = self.read_doc(NOTES_DOC).unwrap_or_default();
        self.images = self.read_doc(IMAGES_DOC).unwrap_or_default();
        let log = self.read_doc(CHANGE_LOG_DOC).unwrap_or_default();
        self.change_log = ChangeLog::from_entries(log, self.change_log.cap());
        self.refresh_images();

        report.projects = self.projects.len();
        report.feedback = self.feedback.len();
        report.tasks = self.tasks.len();
        report.notes = self.notes.len();
        info!(
            projects = report.projects,
            feedback = report.feedback,
            skipped = report.skipped,
            "Loaded local mirror"
        );
        report
    }

    fn read_doc<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.mirror.read(name) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(name, error = %err, "Corrupt mirror document, starting empty");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(name, error = %err, "Mirror read failed, starting empty");
                None
            }
        }
    }

    /// Writes every document. Only serialization errors are returned; storage
    /// failures degrade into the outcome.
    pub fn persist(&mut self) -> Result<PersistOutcome> {
        let entities: Vec<&Entity> = self.projects.iter().chain(self.feedback.iter()).collect();
        let docs = [
            (DATA_DOC, serde_json::to_string(&entities)?),
            (TASKS_DOC, serde_json::to_string(&self.tasks)?),
            (NOTES_DOC, serde_json::to_string(&self.notes)?),
            (CHANGE_LOG_DOC, serde_json::to_string(self.change_log.as_map())?),
            (IMAGES_DOC, serde_json::to_string(&self.images)?)
        ];

        let mut outcome = PersistOutcome::Written;
        for (name, contents) in docs {
            let written = match self.mirror.write(name, &contents) {
                Ok(()) => PersistOutcome::Written,
                Err(err) if err.is_quota() => {
                    warn!(name, error = %err, "Mirror quota exceeded, evicting cached images");
                    self.retry_after_eviction(name, &contents)?
                }
                Err(err) => {
                    warn!(name, error = %err, "Mirror write dropped, in-memory state kept");
                    PersistOutcome::Dropped
                }
            };
            outcome = outcome.max(written);
        }
        Ok(outcome)
    }

    fn retry_after_eviction(&mut self, name: &str, contents: &str) -> Result<PersistOutcome> {
        let live = self.live_project_keys();
        let evicted = self.images.evict_except(&live);
        let images = serde_json::to_string(&self.images)?;
        let image_write = self.mirror.write(IMAGES_DOC, &images);

        let retried = if name == IMAGES_DOC {
            image_write
        } else {
            if let Err(err) = image_write {
                debug!(error = %err, "Image cache rewrite failed during eviction");
            }
            self.mirror.write(name, contents)
        };

        match retried {
            Ok(()) => {
                info!(name, evicted, "Mirror written after evicting cached images");
                Ok(PersistOutcome::WrittenAfterEviction)
            }
            Err(err) => {
                warn!(name, evicted, error = %err, "Mirror write dropped after eviction");
                Ok(PersistOutcome::Dropped)
            }
        }
    }

    /// Empties memory and removes every mirror document.
    pub fn clear(&mut self) {
        self.projects.clear();
        self.feedback.clear();
        self.tasks.clear();
        self.notes.clear();
        self.images.clear();
        self.change_log.clear();
        for name in MIRROR_DOCS {
            if let Err(err) = self.mirror.remove(name) {
                warn!(name, error = %err, "Failed to clear mirror document");
            }
        }
    }

    /// Inserts or replaces by natural key, preferring the live slot when a
    /// tombstone shares the key. Sync fields are left as given.
    pub fn upsert(&mut self, entity: Entity) {
        let list = self.entities_vec_mut(entity.kind);
        let key = entity.natural_key();
        let slot = list
            .iter()
            .position(|e| e.is_live() && e.natural_key() == key)
            .or_else(|| list.iter().position(|e| e.natural_key() == key));
        match slot {
            Some(index) => list[index] = entity,
            None => list.push(entity)
        }
    }

    /// Live entities of `kind`, first occurrence per natural key. Recomputed
    /// on every call.
    pub fn list_live(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> + '_ {
        let mut seen = HashSet::new();
        self.entities(kind)
            .iter()
            .filter(move |e| e.is_live() && seen.insert(e.natural_key()))
    }

    pub fn get_live(&self, kind: EntityKind, key: &str) -> Option<&Entity> {
        self.list_live(kind).find(|e| e.natural_key() == key)
    }

    /// Every stored entity of `kind`, tombstones and duplicates included.
    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Project => &self.projects,
            EntityKind::Feedback => &self.feedback
        }
    }

    fn entities_vec_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        match kind {
            EntityKind::Project => &mut self.projects,
            EntityKind::Feedback => &mut self.feedback
        }
    }

    pub fn replace(&mut self, kind: EntityKind, entities: Vec<Entity>) {
        *self.entities_vec_mut(kind) = entities;
    }

    /// Mutable access to every stored entity of `kind`.
    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut [Entity] {
        self.entities_vec_mut(kind)
    }

    /// Live feedback attached to the project `key`.
    pub fn feedback_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.list_live(EntityKind::Feedback)
            .filter(move |f| f.project_name() == Some(key))
    }

    pub fn live_project_keys(&self) -> HashSet<String> {
        self.list_live(EntityKind::Project)
            .map(|p| p.natural_key().to_string())
            .collect()
    }

    pub fn tasks(&self, key: &str) -> &[Task] {
        self.tasks.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tasks_mut(&mut self, key: &str) -> &mut Vec<Task> {
        self.tasks.entry(key.to_string()).or_default()
    }

    pub fn set_tasks(&mut self, key: &str, tasks: Vec<Task>) {
        self.tasks.insert(key.to_string(), tasks);
    }

    pub fn remove_tasks(&mut self, key: &str) -> Option<Vec<Task>> {
        self.tasks.remove(key)
    }

    pub fn task_map(&self) -> &BTreeMap<String, Vec<Task>> {
        &self.tasks
    }

    pub fn replace_tasks(&mut self, tasks: BTreeMap<String, Vec<Task>>) {
        self.tasks = tasks;
    }

    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    pub fn set_note(&mut self, key: &str, content: String) {
        self.notes.insert(key.to_string(), content);
    }

    pub fn remove_note(&mut self, key: &str) -> Option<String> {
        self.notes.remove(key)
    }

    pub fn note_map(&self) -> &BTreeMap<String, String> {
        &self.notes
    }

    pub fn replace_notes(&mut self, notes: BTreeMap<String, String>) {
        self.notes = notes;
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageCache {
        &mut self.images
    }

    /// Caches images of live projects that carry them and reattaches cached
    /// images to live projects that lost theirs. Returns how many were
    /// reattached.
    pub fn refresh_images(&mut self) -> usize {
        let mut reattached = 0;
        for project in self.projects.iter_mut().filter(|p| p.is_live()) {
            if self.images.reattach(project) {
                reattached += 1;
            } else {
                self.images.remember(project);
            }
        }
        reattached
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    pub fn change_log_mut(&mut self) -> &mut ChangeLog {
        &mut self.change_log
    }
}
