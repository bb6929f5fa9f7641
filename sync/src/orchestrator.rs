//! # Sync Orchestrator
//!
//! Keeps the entity store converged with the hosted store.
//!
//! - Cold load trusts the remote fully and replaces local state.
//! - Pulls fetch the whole tree and merge it in.
//! - Pushes fetch, merge, adopt the merge locally, then write every merged
//!   entity that differs from what the remote holds.
//!
//! One sync gate serializes pushes. A pull that finds the gate taken is
//! deferred to the next trigger instead of waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::SubsecRound;
use config::{Config, SyncConfig};
use errors::RemoteError;
use parking_lot::Mutex;
use pr_core::{
    Clock, Collection, Entity, EntityKind, LocalMirror, NoteDoc, RemoteStore, RemoteTree,
    SystemClock, TaskList, Timestamp
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use crate::change_log::DEFAULT_CAP;
use crate::error::{Result, SyncError};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventBus, StoreEvent};
use crate::key_registry::KeyRegistry;
use crate::merge::{MergeReport, merge};
use crate::migrate;
use crate::state::{LoadSource, PullMode, PullOutcome, PullSummary, PushOutcome, SyncStats};
use crate::store::{EntityStore, PersistOutcome};
use crate::telemetry::SyncTelemetry;

const ENTITY_KINDS: [EntityKind; 2] = [EntityKind::Project, EntityKind::Feedback];
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

pub struct OrchestratorOptions {
    pub sync: SyncConfig,
    pub change_log_cap: usize,
    pub telemetry: SyncTelemetry,
    pub clock: Arc<dyn Clock>,
    pub event_capacity: usize
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            change_log_cap: DEFAULT_CAP,
            telemetry: SyncTelemetry::default(),
            clock: Arc::new(SystemClock),
            event_capacity: DEFAULT_EVENT_CAPACITY
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sync: config.sync.clone(),
            change_log_cap: config.workspace.change_log_cap,
            telemetry: SyncTelemetry::new(&config.observability),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct Shared {
    remote: Arc<dyn RemoteStore>,
    store: Mutex<EntityStore>,
    registry: Mutex<KeyRegistry>,
    gate: tokio::sync::Mutex<()>,
    clock: Arc<dyn Clock>,
    sync: SyncConfig,
    events: EventBus,
    telemetry: SyncTelemetry,
    data_loaded: AtomicBool,
    stats: Mutex<SyncStats>
}

/// Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct SyncOrchestrator {
    shared: Arc<Shared>
}

impl SyncOrchestrator {
    /// Loads the local mirror right away, so reads work before the first
    /// remote round trip.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        mirror: Arc<dyn LocalMirror>,
        options: OrchestratorOptions,
    ) -> Self {
        let mut store = EntityStore::new(mirror, options.change_log_cap);
        store.load();
        let mut registry = KeyRegistry::new();
        registry.rebuild(store.list_live(EntityKind::Project).map(Entity::natural_key));

        Self {
            shared: Arc::new(Shared {
                remote,
                store: Mutex::new(store),
                registry: Mutex::new(registry),
                gate: tokio::sync::Mutex::new(()),
                clock: options.clock,
                sync: options.sync,
                events: EventBus::new(options.event_capacity),
                telemetry: options.telemetry,
                data_loaded: AtomicBool::new(false),
                stats: Mutex::new(SyncStats::default())
            })
        }
    }

    /// Current time at the millisecond precision stored documents keep.
    pub fn now(&self) -> Timestamp {
        self.shared.clock.now().trunc_subsecs(3)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        self.shared.events.emit(event);
    }

    pub fn is_data_loaded(&self) -> bool {
        self.shared.data_loaded.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SyncStats {
        self.shared.stats.lock().clone()
    }

    pub fn telemetry(&self) -> SyncTelemetry {
        self.shared.telemetry
    }

    pub(crate) fn shared_remote(&self) -> &Arc<dyn RemoteStore> {
        &self.shared.remote
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        f(&*self.shared.store.lock())
    }

    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut EntityStore) -> R) -> R {
        f(&mut *self.shared.store.lock())
    }

    /// Writes the store to the mirror.
    pub fn persist(&self) -> Result<PersistOutcome> {
        let outcome = self.shared.store.lock().persist()?;
        self.shared.telemetry.record_persist(outcome);
        Ok(outcome)
    }

    fn persist_locked(&self, store: &mut EntityStore) -> PersistOutcome {
        match store.persist() {
            Ok(outcome) => {
                self.shared.telemetry.record_persist(outcome);
                outcome
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize local state");
                PersistOutcome::Dropped
            }
        }
    }

    /// Remote path segment for a project name.
    pub fn remote_key(&self, natural: &str) -> String {
        self.shared.registry.lock().register(natural)
    }

    /// Project name behind a remote key, or the key itself when ambiguous.
    pub fn natural_key_for(&self, sanitized: &str) -> String {
        self.shared.registry.lock().resolve(sanitized)
    }

    fn entity_remote_key(registry: &mut KeyRegistry, entity: &Entity) -> String {
        match entity.kind {
            EntityKind::Project => registry.register(entity.natural_key()),
            EntityKind::Feedback => utils::sanitize_key(&entity.id)
        }
    }

    /// Initial load: the remote replaces local state entirely. When the
    /// remote is unreachable the mirror contents stay.
    #[tracing::instrument(skip(self))]
    pub async fn cold_load(&self) -> LoadSource {
        let _gate = self.shared.gate.lock().await;
        self.cold_load_locked().await
    }

    async fn cold_load_locked(&self) -> LoadSource {
        let source = match self.shared.remote.fetch_all().await {
            Ok(tree) => {
                self.replace_from_tree(tree);
                self.shared.stats.lock().last_pull_at = Some(self.now());
                LoadSource::Remote
            }
            Err(err) => {
                tracing::warn!(error = %err, "Cold load fell back to the local mirror");
                LoadSource::LocalMirror
            }
        };

        let live_projects = {
            let now = self.now();
            let mut store = self.shared.store.lock();
            let projects = migrate::backfill(store.entities_mut(EntityKind::Project), now);
            let feedback = migrate::backfill(store.entities_mut(EntityKind::Feedback), now);
            if projects.total() + feedback.total() > 0 {
                tracing::info!(
                    projects = projects.projects,
                    feedback = feedback.feedback,
                    "Backfilled missing fields"
                );
            }
            store.refresh_images();
            self.persist_locked(&mut store);
            store.list_live(EntityKind::Project).count()
        };

        self.shared.data_loaded.store(true, Ordering::SeqCst);
        self.shared.telemetry.set_live_projects(live_projects);
        self.emit(StoreEvent::Reloaded);
        tracing::info!(source = ?source, live_projects, "Cold load complete");
        source
    }

    fn replace_from_tree(&self, tree: RemoteTree) {
        let RemoteTree {
            projects,
            feedback,
            tasks,
            notes
        } = tree;
        let mut store = self.shared.store.lock();
        let mut registry = self.shared.registry.lock();

        store.replace(EntityKind::Project, projects.into_values().collect());
        store.replace(EntityKind::Feedback, feedback.into_values().collect());
        registry.rebuild(store.list_live(EntityKind::Project).map(Entity::natural_key));

        store.replace_tasks(
            tasks
                .into_iter()
                .map(|(key, list)| (registry.resolve(&key), list.tasks))
                .collect()
        );
        store.replace_notes(
            notes
                .into_iter()
                .filter_map(|(key, doc)| doc.content.map(|content| (registry.resolve(&key), content)))
                .collect()
        );
    }

    /// Clears every local copy, then cold loads again.
    #[tracing::instrument(skip(self))]
    pub async fn reset_and_resync(&self) -> LoadSource {
        let _gate = self.shared.gate.lock().await;
        {
            let mut store = self.shared.store.lock();
            store.clear();
            self.shared.registry.lock().rebuild(std::iter::empty());
        }
        self.shared.data_loaded.store(false, Ordering::SeqCst);
        tracing::info!("Local state cleared, resyncing");
        self.cold_load_locked().await
    }

    #[tracing::instrument(skip(self))]
    pub async fn pull(&self, mode: PullMode) -> PullOutcome {
        let outcome = self.pull_inner(mode).await;
        self.shared.telemetry.record_pull(&outcome);
        outcome
    }

    async fn pull_inner(&self, mode: PullMode) -> PullOutcome {
        let Ok(_gate) = self.shared.gate.try_lock() else {
            self.shared.stats.lock().pulls_deferred += 1;
            tracing::warn!("Pull deferred while a push is in flight");
            return PullOutcome::Deferred;
        };

        if mode == PullMode::Silent && self.last_pull_is_fresh() {
            self.shared.stats.lock().pulls_skipped_fresh += 1;
            tracing::debug!("Silent pull skipped, last pull is fresh");
            return PullOutcome::SkippedFresh;
        }

        let tree = match self.shared.remote.fetch_all().await {
            Ok(tree) => tree,
            Err(err) => {
                self.shared.stats.lock().pulls_failed += 1;
                tracing::warn!(error = %err, "Pull failed, keeping local state");
                return PullOutcome::Failed;
            }
        };

        let summary = self.apply_tree(tree, self.is_data_loaded());
        {
            let mut stats = self.shared.stats.lock();
            stats.pulls += 1;
            stats.last_pull_at = Some(self.now());
        }
        tracing::info!(
            project_conflicts = summary.projects.conflicts(),
            feedback_conflicts = summary.feedback.conflicts(),
            tasks_updated = summary.tasks_updated,
            notes_updated = summary.notes_updated,
            "Pull applied"
        );
        PullOutcome::Applied(summary)
    }

    fn last_pull_is_fresh(&self) -> bool {
        let freshness = chrono::Duration::seconds(self.shared.sync.pull_freshness_seconds as i64);
        let now = self.now();
        self.shared
            .stats
            .lock()
            .last_pull_at
            .is_some_and(|last| now - last < freshness)
    }

    /// Merges a remote snapshot into the store. Tasks and notes present
    /// remotely overwrite local values; local-only keys stay.
    pub(crate) fn apply_tree(&self, tree: RemoteTree, emit: bool) -> PullSummary {
        let RemoteTree {
            projects,
            feedback,
            tasks,
            notes
        } = tree;
        let mut summary = PullSummary::default();
        let mut tasks_changed = Vec::new();
        let mut notes_changed = Vec::new();

        {
            let mut store = self.shared.store.lock();
            let mut registry = self.shared.registry.lock();

            summary.projects = merge_into(
                &mut store,
                EntityKind::Project,
                projects.into_values().collect()
            );
            summary.feedback = merge_into(
                &mut store,
                EntityKind::Feedback,
                feedback.into_values().collect()
            );
            registry.rebuild(store.list_live(EntityKind::Project).map(Entity::natural_key));

            for (remote_key, list) in tasks {
                let key = registry.resolve(&remote_key);
                if store.tasks(&key) != list.tasks.as_slice() {
                    store.set_tasks(&key, list.tasks);
                    tasks_changed.push(key);
                }
            }
            for (remote_key, doc) in notes {
                let Some(content) = doc.content else {
                    continue;
                };
                let key = registry.resolve(&remote_key);
                if store.note(&key) != Some(content.as_str()) {
                    store.set_note(&key, content);
                    notes_changed.push(key);
                }
            }

            store.refresh_images();
            self.persist_locked(&mut store);
            self.shared
                .telemetry
                .set_live_projects(store.list_live(EntityKind::Project).count());
        }

        summary.tasks_updated = tasks_changed.len();
        summary.notes_updated = notes_changed.len();
        if emit {
            if summary.projects.changes_local() {
                self.emit(StoreEvent::ProjectsChanged);
            }
            if summary.feedback.changes_local() {
                self.emit(StoreEvent::FeedbackChanged);
            }
            for key in tasks_changed {
                self.emit(StoreEvent::TasksChanged { key });
            }
            for key in notes_changed {
                self.emit(StoreEvent::NotesChanged { key });
            }
        }
        summary
    }

    /// Read-merge-write against the remote, retried with exponential backoff
    /// while the remote is unreachable.
    #[tracing::instrument(skip(self))]
    pub async fn push(&self) -> PushOutcome {
        let _gate = self.shared.gate.lock().await;
        let started = Instant::now();
        let sync = &self.shared.sync;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((sync.push_retry_base_ms / 2).max(1))
            .max_delay(MAX_RETRY_DELAY)
            .take(sync.push_retry_attempts as usize);

        let result = RetryIf::spawn(
            strategy,
            || self.push_once(),
            |err: &SyncError| {
                let retry = err.is_retryable();
                if retry {
                    tracing::warn!(error = %err, "Push attempt failed");
                }
                retry
            }
        )
        .await;

        match result {
            Ok(written) => {
                {
                    let mut stats = self.shared.stats.lock();
                    stats.pushes += 1;
                    stats.entities_written += written as u64;
                    stats.last_push_at = Some(self.now());
                }
                self.shared.telemetry.record_push(written, started);
                tracing::info!(written, "Push complete");
                PushOutcome::Pushed { written }
            }
            Err(err) => {
                self.shared.stats.lock().pushes_failed += 1;
                self.shared.telemetry.record_push_failure();
                tracing::error!(error = %err, "Push abandoned");
                PushOutcome::Failed
            }
        }
    }

    async fn push_once(&self) -> Result<usize> {
        let tree = self.shared.remote.fetch_all().await?;
        let writes = self.adopt_for_push(&tree);

        let mut written = 0;
        for (collection, key, value) in writes {
            self.shared
                .remote
                .put_entity(collection, &key, &value)
                .await?;
            written += 1;
        }
        Ok(written)
    }

    /// Adopts `merge(local, remote)` and lists the documents the remote lacks.
    fn adopt_for_push(&self, tree: &RemoteTree) -> Vec<(Collection, String, serde_json::Value)> {
        let mut writes = Vec::new();
        let mut changed = Vec::new();
        {
            let mut store = self.shared.store.lock();
            let mut registry = self.shared.registry.lock();

            for kind in ENTITY_KINDS {
                let remote: Vec<Entity> = tree.entities(kind).values().cloned().collect();
                let report = merge_into(&mut store, kind, remote);
                if report.changes_local() {
                    changed.push(kind);
                }
            }
            store.refresh_images();
            registry.rebuild(store.list_live(EntityKind::Project).map(Entity::natural_key));

            for kind in ENTITY_KINDS {
                let remote_docs = tree.entities(kind);
                for entity in store.entities(kind) {
                    let key = Self::entity_remote_key(&mut registry, entity);
                    if !utils::is_valid_remote_key(&key) {
                        tracing::warn!(key = %key, "Skipping entity without a usable remote key");
                        continue;
                    }
                    if remote_docs.get(&key) != Some(entity) {
                        match entity.try_to_json() {
                            Ok(doc) => {
                                tracing::debug!(collection = %kind.collection(), key = %key, "Queueing write");
                                writes.push((kind.collection(), key, doc));
                            }
                            Err(err) => {
                                tracing::error!(key = %key, error = %err, "Skipping entity that failed to serialize");
                            }
                        }
                    }
                }
            }
            self.persist_locked(&mut store);
        }

        if self.is_data_loaded() {
            for kind in changed {
                self.emit(match kind {
                    EntityKind::Project => StoreEvent::ProjectsChanged,
                    EntityKind::Feedback => StoreEvent::FeedbackChanged
                });
            }
        }
        writes
    }

    /// Single-entity write used by submissions. Not retried.
    pub async fn write_entity(&self, entity: &Entity) -> std::result::Result<(), RemoteError> {
        let key = Self::entity_remote_key(&mut self.shared.registry.lock(), entity);
        let doc = entity.try_to_json().map_err(|e| RemoteError::MalformedDocument {
            path: format!("{}/{key}", entity.kind.collection().as_str()),
            reason: e.to_string()
        })?;
        self.shared
            .remote
            .put_entity(entity.kind.collection(), &key, &doc)
            .await
    }

    pub async fn write_tasks(&self, key: &str) -> Result<()> {
        let (remote_key, doc) = {
            let store = self.shared.store.lock();
            let remote_key = self.shared.registry.lock().register(key);
            let doc = TaskList {
                tasks: store.tasks(key).to_vec(),
                last_modified: Some(self.now())
            };
            (remote_key, doc)
        };
        let value = serde_json::to_value(&doc)?;
        self.shared
            .remote
            .put_entity(Collection::Tasks, &remote_key, &value)
            .await?;
        Ok(())
    }

    pub async fn write_notes(&self, key: &str) -> Result<()> {
        let (remote_key, doc) = {
            let store = self.shared.store.lock();
            let remote_key = self.shared.registry.lock().register(key);
            let doc = NoteDoc {
                content: Some(store.note(key).unwrap_or_default().to_string()),
                last_modified: Some(self.now())
            };
            (remote_key, doc)
        };
        let value = serde_json::to_value(&doc)?;
        self.shared
            .remote
            .put_entity(Collection::Notes, &remote_key, &value)
            .await?;
        Ok(())
    }

    /// Removes `tasks/<key>` and `notes/<key>`.
    pub async fn remove_children(&self, key: &str) -> Result<()> {
        let remote_key = utils::sanitize_key(key);
        self.shared
            .remote
            .remove_entity(Collection::Tasks, &remote_key)
            .await?;
        self.shared
            .remote
            .remove_entity(Collection::Notes, &remote_key)
            .await?;
        Ok(())
    }

    pub fn schedule_push(&self) -> JoinHandle<PushOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.push().await })
    }

    pub fn schedule_tasks_write(&self, key: &str) -> JoinHandle<()> {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.write_tasks(&key).await {
                tracing::warn!(key = %key, error = %err, "Task write-through failed");
            }
        })
    }

    pub fn schedule_notes_write(&self, key: &str) -> JoinHandle<()> {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.write_notes(&key).await {
                tracing::warn!(key = %key, error = %err, "Notes write-through failed");
            }
        })
    }

    pub fn schedule_remove_children(&self, key: &str) -> JoinHandle<()> {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.remove_children(&key).await {
                tracing::warn!(key = %key, error = %err, "Removing tasks and notes failed");
            }
        })
    }

    /// Becoming visible triggers a silent pull.
    pub fn on_visibility_change(&self, visible: bool) -> Option<JoinHandle<PullOutcome>> {
        if !visible {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move { this.pull(PullMode::Silent).await }))
    }

    /// Fixed-interval silent pulls for remotes without live subscriptions.
    pub fn start_polling(&self) -> PollingHandle {
        let this = self.clone();
        let period = Duration::from_secs(self.shared.sync.poll_interval_seconds.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.pull(PullMode::Silent).await;
            }
        });
        tracing::info!(interval_secs = period.as_secs(), "Polling started");
        PollingHandle { handle }
    }

    pub(crate) fn record_live_delivery(&self, collection: Collection) {
        self.shared.stats.lock().live_deliveries += 1;
        self.shared.telemetry.record_live_delivery(collection);
    }
}

fn merge_into(store: &mut EntityStore, kind: EntityKind, remote: Vec<Entity>) -> MergeReport {
    let outcome = merge(store.entities(kind), &remote);
    let report = outcome.report;
    store.replace(kind, outcome.into_entities());
    report
}

/// Owns the polling task. Stopping or dropping the handle aborts it.
pub struct PollingHandle {
    handle: JoinHandle<()>
}

impl PollingHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
