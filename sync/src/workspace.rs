//! # Workspace API
//!
//! The calls a presentation layer makes. Every mutation lands in the entity
//! store and the mirror before returning; the remote catches up through a
//! scheduled push or write-through. Submissions are the exception and await
//! their single-entity write.

use std::collections::BTreeSet;

use config::WorkspaceConfig;
use errors::RemoteError;
use parking_lot::Mutex;
use pr_core::{
    ChangeAction, ChangeLogEntry, Entity, EntityKind, FeedbackFields, ImageRef, ProjectFields,
    ProjectStatus, Task, Timestamp
};
use pr_core::types::STATUS_FIELD;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::error::SyncError;
use crate::events::StoreEvent;
use crate::orchestrator::SyncOrchestrator;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Project not found: {key}")]
    ProjectNotFound { key: String },

    #[error("Project already exists: {key}")]
    ProjectExists { key: String },

    #[error("Task {index} not found on project {key}")]
    TaskNotFound { key: String, index: usize },

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The change is stored locally and rides the next push.
    #[error("Remote write failed: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sync(#[from] SyncError)
}

pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("must not be blank"))
    } else {
        Ok(())
    }
}

/// A project submission as the form collects it.
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct NewProject {
    #[validate(length(max = 200), custom(function = "non_blank"))]
    pub project_name: String,
    pub project_type: String,
    /// Defaults to the current author.
    pub creator: Option<String>,
    pub summary: String,
    pub problem: String,
    pub success: String,
    pub current_state: String,
    #[validate(length(max = 2048))]
    pub link: String,
    pub status: ProjectStatus,
    pub tags: Vec<String>,
    pub images: Vec<ImageRef>,
    pub attachments: String
}

impl NewProject {
    pub fn named(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Self::default()
        }
    }

    /// Splits a comma separated tag field, dropping blanks.
    pub fn parse_tags(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn into_fields(self, author: &str, max_images: usize) -> ProjectFields {
        let mut images = self.images;
        if images.len() > max_images {
            warn!(
                project = %self.project_name,
                submitted = images.len(),
                kept = max_images,
                "Dropping images over the submission limit"
            );
            images.truncate(max_images);
        }
        ProjectFields {
            project_name: self.project_name.trim().to_string(),
            project_type: self.project_type,
            creator: self.creator.unwrap_or_else(|| author.to_string()),
            summary: self.summary,
            problem: self.problem,
            success: self.success,
            current_state: self.current_state,
            link: self.link,
            status: self.status,
            tags: self.tags,
            images,
            attachments: self.attachments
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct NewFeedback {
    #[validate(custom(function = "non_blank"))]
    pub project_name: String,
    #[validate(custom(function = "non_blank"))]
    pub feedback_text: String,
    /// Defaults to the current author.
    pub author: Option<String>
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub projects: usize,
    pub feedback: usize
}

pub struct Workspace {
    orchestrator: SyncOrchestrator,
    config: WorkspaceConfig,
    author: Mutex<String>
}

impl Workspace {
    pub fn new(orchestrator: SyncOrchestrator, config: WorkspaceConfig) -> Self {
        let author = config.initial_author();
        Self {
            orchestrator,
            config,
            author: Mutex::new(author)
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn author(&self) -> String {
        self.author.lock().clone()
    }

    pub fn set_author(&self, author: impl Into<String>) {
        *self.author.lock() = author.into();
    }

    pub fn team(&self) -> &[String] {
        &self.config.team
    }

    fn commit(&self, events: impl IntoIterator<Item = StoreEvent>) -> WorkspaceResult<()> {
        self.orchestrator.persist()?;
        for event in events {
            self.orchestrator.emit(event);
        }
        Ok(())
    }

    fn ensure_live(&self, key: &str) -> WorkspaceResult<()> {
        let live = self
            .orchestrator
            .with_store(|store| store.get_live(EntityKind::Project, key).is_some());
        if live {
            Ok(())
        } else {
            Err(WorkspaceError::ProjectNotFound {
                key: key.to_string()
            })
        }
    }

    /// Creates a project and writes it to the remote. Re-submitting over a
    /// tombstone resurrects the name with a version above the tombstone.
    #[tracing::instrument(skip(self, new), fields(project = %new.project_name))]
    pub async fn submit_project(&self, new: NewProject) -> WorkspaceResult<Entity> {
        new.validate()?;
        let author = self.author();
        let now = self.orchestrator.now();
        let fields = new.into_fields(&author, self.config.max_submission_images);
        let key = fields.project_name.clone();

        let entity = self.orchestrator.with_store_mut(|store| {
            if store.get_live(EntityKind::Project, &key).is_some() {
                return Err(WorkspaceError::ProjectExists { key: key.clone() });
            }
            let floor = store
                .entities(EntityKind::Project)
                .iter()
                .filter(|e| e.natural_key() == key)
                .map(|e| e.version)
                .max()
                .unwrap_or(0);

            let mut entity = Entity::new(
                EntityKind::Project,
                utils::generate_id(),
                fields.into_payload(),
                now
            );
            entity.version = floor + 1;
            store.upsert(entity.clone());
            store.images_mut().remember(&entity);
            store
                .change_log_mut()
                .record(&key, now, &author, ChangeAction::Created, "Submitted project");
            Ok(entity)
        })?;

        self.commit([
            StoreEvent::ProjectsChanged,
            StoreEvent::ChangeLogged { key: key.clone() }
        ])?;
        self.orchestrator.write_entity(&entity).await?;
        info!(project = %key, version = entity.version, "Project submitted");
        Ok(entity)
    }

    #[tracing::instrument(skip(self, new), fields(project = %new.project_name))]
    pub async fn submit_feedback(&self, new: NewFeedback) -> WorkspaceResult<Entity> {
        new.validate()?;
        let key = new.project_name.trim().to_string();
        self.ensure_live(&key)?;
        let now = self.orchestrator.now();
        let author = new.author.unwrap_or_else(|| self.author());

        let fields = FeedbackFields {
            project_name: key.clone(),
            author: author.clone(),
            feedback_text: new.feedback_text.trim().to_string(),
            ..FeedbackFields::default()
        };
        let entity = Entity::new(
            EntityKind::Feedback,
            utils::generate_id(),
            fields.into_payload(),
            now
        );

        self.orchestrator.with_store_mut(|store| {
            store.upsert(entity.clone());
            store
                .change_log_mut()
                .record(&key, now, &author, ChangeAction::Feedback, "Submitted feedback");
        });
        self.commit([
            StoreEvent::FeedbackChanged,
            StoreEvent::ChangeLogged { key: key.clone() }
        ])?;
        self.orchestrator.write_entity(&entity).await?;
        info!(project = %key, feedback = %entity.id, "Feedback submitted");
        Ok(entity)
    }

    /// Applies `edit` to the live project `key`, then logs, persists and
    /// schedules a push. `edit` stamps the entity and returns the change
    /// description, or `None` to leave everything untouched.
    fn mutate_project(
        &self,
        key: &str,
        action: ChangeAction,
        edit: impl FnOnce(&mut Entity, Timestamp) -> WorkspaceResult<Option<String>>,
    ) -> WorkspaceResult<Entity> {
        let now = self.orchestrator.now();
        let author = self.author();

        let (entity, changed) = self.orchestrator.with_store_mut(|store| {
            let mut entity = store
                .get_live(EntityKind::Project, key)
                .cloned()
                .ok_or_else(|| WorkspaceError::ProjectNotFound {
                    key: key.to_string()
                })?;
            let Some(description) = edit(&mut entity, now)? else {
                return Ok((entity, false));
            };
            store.upsert(entity.clone());
            store.images_mut().remember(&entity);
            store
                .change_log_mut()
                .record(key, now, &author, action, description);
            Ok::<_, WorkspaceError>((entity, true))
        })?;

        if changed {
            self.commit([
                StoreEvent::ProjectsChanged,
                StoreEvent::ChangeLogged {
                    key: key.to_string()
                }
            ])?;
            self.orchestrator.schedule_push();
        }
        Ok(entity)
    }

    /// Setting the current status again is a no-op.
    pub fn update_status(&self, key: &str, status: ProjectStatus) -> WorkspaceResult<Entity> {
        self.mutate_project(key, ChangeAction::Updated, |entity, now| {
            if entity.status() == Some(status) {
                return Ok(None);
            }
            entity.set_field(STATUS_FIELD, Value::String(status.to_string()));
            entity.touch(now);
            Ok(Some(format!("Changed status to {}", status.label())))
        })
    }

    pub fn add_images(&self, key: &str, images: Vec<ImageRef>) -> WorkspaceResult<Entity> {
        if images.is_empty() {
            return Err(WorkspaceError::InvalidInput("no images to add".to_string()));
        }
        let added = images.len();
        let encoded = images
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SyncError::from)?;

        self.mutate_project(key, ChangeAction::Updated, |entity, now| {
            let mut all = entity.images().to_vec();
            all.extend(encoded);
            entity.set_images(all);
            entity.touch(now);
            Ok(Some(format!("Added {added} screenshot(s)")))
        })
    }

    /// Tombstones the project. It leaves live listings on every writer once
    /// the push lands.
    pub fn soft_delete(&self, key: &str) -> WorkspaceResult<Entity> {
        self.mutate_project(key, ChangeAction::Deleted, |entity, now| {
            entity.tombstone(now);
            Ok(Some("Deleted project".to_string()))
        })
    }

    /// Hard delete: tombstones the project and its feedback and drops every
    /// local channel keyed by the project.
    #[tracing::instrument(skip(self))]
    pub fn purge(&self, key: &str) -> WorkspaceResult<PurgeSummary> {
        self.ensure_live(key)?;
        let now = self.orchestrator.now();

        let summary = self.orchestrator.with_store_mut(|store| {
            let mut summary = PurgeSummary::default();
            for project in store.entities_mut(EntityKind::Project) {
                if project.is_live() && project.natural_key() == key {
                    project.tombstone(now);
                    summary.projects += 1;
                }
            }
            for feedback in store.entities_mut(EntityKind::Feedback) {
                if feedback.is_live() && feedback.project_name() == Some(key) {
                    feedback.tombstone(now);
                    summary.feedback += 1;
                }
            }
            store.remove_tasks(key);
            store.remove_note(key);
            store.images_mut().remove(key);
            store.change_log_mut().remove(key);
            summary
        });

        self.commit([StoreEvent::ProjectsChanged, StoreEvent::FeedbackChanged])?;
        self.orchestrator.schedule_push();
        self.orchestrator.schedule_remove_children(key);
        info!(
            project = %key,
            projects = summary.projects,
            feedback = summary.feedback,
            "Project purged"
        );
        Ok(summary)
    }

    fn log_channel_change(
        &self,
        key: &str,
        action: ChangeAction,
        description: String,
        event: StoreEvent,
    ) -> WorkspaceResult<()> {
        let now = self.orchestrator.now();
        let author = self.author();
        self.orchestrator.with_store_mut(|store| {
            store
                .change_log_mut()
                .record(key, now, &author, action, description);
        });
        self.commit([
            event,
            StoreEvent::ChangeLogged {
                key: key.to_string()
            }
        ])
    }

    pub fn add_task(&self, key: &str, text: &str, assignee: &str) -> WorkspaceResult<Task> {
        self.ensure_live(key)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkspaceError::InvalidInput("task text is empty".to_string()));
        }
        if !self.config.team.iter().any(|member| member == assignee) {
            return Err(WorkspaceError::InvalidInput(format!(
                "{assignee} is not on the team"
            )));
        }

        let task = Task {
            text: text.to_string(),
            assignee: assignee.to_string(),
            completed: false,
            created_at: Some(self.orchestrator.now())
        };
        self.orchestrator
            .with_store_mut(|store| store.tasks_mut(key).push(task.clone()));
        self.log_channel_change(
            key,
            ChangeAction::Task,
            format!("Added task: \"{text}\" (assigned to {assignee})"),
            StoreEvent::TasksChanged {
                key: key.to_string()
            }
        )?;
        self.orchestrator.schedule_tasks_write(key);
        Ok(task)
    }

    pub fn toggle_task(&self, key: &str, index: usize) -> WorkspaceResult<Task> {
        self.ensure_live(key)?;
        let task = self.orchestrator.with_store_mut(|store| {
            store.tasks_mut(key).get_mut(index).map(|task| {
                task.completed = !task.completed;
                task.clone()
            })
        });
        let task = task.ok_or_else(|| WorkspaceError::TaskNotFound {
            key: key.to_string(),
            index
        })?;

        let verb = if task.completed { "Completed" } else { "Reopened" };
        self.log_channel_change(
            key,
            ChangeAction::Task,
            format!("{verb} task: \"{}\"", task.text),
            StoreEvent::TasksChanged {
                key: key.to_string()
            }
        )?;
        self.orchestrator.schedule_tasks_write(key);
        Ok(task)
    }

    pub fn delete_task(&self, key: &str, index: usize) -> WorkspaceResult<Task> {
        self.ensure_live(key)?;
        let removed = self.orchestrator.with_store_mut(|store| {
            let tasks = store.tasks_mut(key);
            (index < tasks.len()).then(|| tasks.remove(index))
        });
        let task = removed.ok_or_else(|| WorkspaceError::TaskNotFound {
            key: key.to_string(),
            index
        })?;

        self.log_channel_change(
            key,
            ChangeAction::Deleted,
            format!("Deleted task: \"{}\"", task.text),
            StoreEvent::TasksChanged {
                key: key.to_string()
            }
        )?;
        self.orchestrator.schedule_tasks_write(key);
        Ok(task)
    }

    /// Stores trimmed notes. Clearing the notes is synced but not logged.
    pub fn save_notes(&self, key: &str, text: &str) -> WorkspaceResult<()> {
        self.ensure_live(key)?;
        let notes = text.trim().to_string();
        let had_notes = self.orchestrator.with_store_mut(|store| {
            let had = store.note(key).is_some_and(|old| !old.is_empty());
            store.set_note(key, notes.clone());
            had
        });

        let event = StoreEvent::NotesChanged {
            key: key.to_string()
        };
        if notes.is_empty() {
            self.commit([event])?;
        } else if had_notes {
            self.log_channel_change(
                key,
                ChangeAction::Updated,
                "Updated creator notes".to_string(),
                event
            )?;
        } else {
            self.log_channel_change(
                key,
                ChangeAction::Created,
                "Added creator notes".to_string(),
                event
            )?;
        }
        self.orchestrator.schedule_notes_write(key);
        Ok(())
    }

    pub fn live_projects(&self) -> Vec<Entity> {
        self.orchestrator
            .with_store(|store| store.list_live(EntityKind::Project).cloned().collect())
    }

    pub fn project(&self, key: &str) -> Option<Entity> {
        self.orchestrator
            .with_store(|store| store.get_live(EntityKind::Project, key).cloned())
    }

    /// Live projects grouped in display order. A missing or unknown status
    /// counts as in progress.
    pub fn projects_by_status(&self) -> Vec<(ProjectStatus, Vec<Entity>)> {
        let mut groups: Vec<(ProjectStatus, Vec<Entity>)> = ProjectStatus::ORDER
            .iter()
            .map(|status| (*status, Vec::new()))
            .collect();
        for project in self.live_projects() {
            let status = project.status().unwrap_or_default();
            if let Some((_, members)) = groups.iter_mut().find(|(s, _)| *s == status) {
                members.push(project);
            }
        }
        groups
    }

    /// Live projects matching `status` (when given) and carrying every tag
    /// in `tags`.
    pub fn filter_projects(&self, status: Option<ProjectStatus>, tags: &[&str]) -> Vec<Entity> {
        self.live_projects()
            .into_iter()
            .filter(|p| status.is_none_or(|s| p.status().unwrap_or_default() == s))
            .filter(|p| {
                let own = p.tags();
                tags.iter().all(|tag| own.contains(tag))
            })
            .collect()
    }

    /// Every tag used by a live project, sorted.
    pub fn all_tags(&self) -> Vec<String> {
        self.orchestrator.with_store(|store| {
            store
                .list_live(EntityKind::Project)
                .flat_map(|p| p.tags().into_iter().map(str::to_string))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }

    pub fn feedback_for(&self, key: &str) -> Vec<Entity> {
        self.orchestrator
            .with_store(|store| store.feedback_for(key).cloned().collect())
    }

    pub fn tasks_for(&self, key: &str) -> Vec<Task> {
        self.orchestrator.with_store(|store| store.tasks(key).to_vec())
    }

    pub fn tasks_remaining(&self, key: &str) -> usize {
        self.orchestrator
            .with_store(|store| store.tasks(key).iter().filter(|t| !t.completed).count())
    }

    pub fn notes_for(&self, key: &str) -> Option<String> {
        self.orchestrator
            .with_store(|store| store.note(key).map(str::to_string))
    }

    pub fn change_log(&self, key: &str) -> Vec<ChangeLogEntry> {
        self.orchestrator
            .with_store(|store| store.change_log().entries(key).to_vec())
    }
}
