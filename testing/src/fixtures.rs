use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use errors::RemoteError;
use parking_lot::Mutex;
use pr_core::{
    ChangeCallback, Clock, Collection, Entity, EntityKind, ProjectStatus, RemoteStore, RemoteTree,
    Subscription, Timestamp
};
use serde_json::{Map, Value, json};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Seconds after the epoch, the time unit every fixture speaks.
pub fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start)
        }
    }

    pub fn at_secs(secs: i64) -> Self {
        Self::new(at(secs))
    }

    pub fn advance_secs(&self, secs: i64) -> Timestamp {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
        *now
    }

    pub fn set(&self, ts: Timestamp) {
        *self.now.lock() = ts;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Builds a project entity the way a writer would have stored it.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    entity: Entity
}

impl ProjectBuilder {
    pub fn new(name: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("projectName".to_string(), json!(name));
        payload.insert("projectType".to_string(), json!("Tool"));
        payload.insert("creator".to_string(), json!("Jason"));
        payload.insert("summary".to_string(), json!(format!("{name} summary")));
        payload.insert("status".to_string(), json!("in_progress"));
        payload.insert("tags".to_string(), json!([]));
        Self {
            entity: Entity::new(EntityKind::Project, format!("p-{name}"), payload, at(1))
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.entity.id = id.to_string();
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.entity.version = version;
        self
    }

    /// Sets both creation and modification time.
    pub fn at(mut self, secs: i64) -> Self {
        self.entity.timestamp = Some(at(secs));
        self.entity.last_modified = Some(at(secs));
        self
    }

    pub fn last_modified(mut self, secs: i64) -> Self {
        self.entity.last_modified = Some(at(secs));
        self
    }

    pub fn deleted_at(mut self, secs: i64) -> Self {
        self.entity.deleted_at = Some(at(secs));
        self
    }

    pub fn status(mut self, status: ProjectStatus) -> Self {
        self.entity.set_field("status", json!(status.to_string()));
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.entity.set_field("tags", json!(tags));
        self
    }

    pub fn images(mut self, count: usize) -> Self {
        let images = (0..count)
            .map(|i| json!({"src": format!("data:image/png;base64,{i}"), "note": "", "filename": format!("shot-{i}.png")}))
            .collect();
        self.entity.set_images(images);
        self
    }

    pub fn field(mut self, name: &str, value: Value) -> Self {
        self.entity.set_field(name, value);
        self
    }

    /// Drops the sync fields, as documents from older writers lack them.
    pub fn legacy(mut self) -> Self {
        self.entity.version = 0;
        self.entity.last_modified = None;
        self.entity.payload.remove("status");
        self.entity.payload.remove("tags");
        self
    }

    pub fn build(self) -> Entity {
        self.entity
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackBuilder {
    entity: Entity
}

impl FeedbackBuilder {
    pub fn new(id: &str, project: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("projectName".to_string(), json!(project));
        payload.insert("author".to_string(), json!("Ash"));
        payload.insert("feedbackText".to_string(), json!("Looks useful"));
        Self {
            entity: Entity::new(EntityKind::Feedback, id.to_string(), payload, at(1))
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.entity.set_field("feedbackText", json!(text));
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.entity.version = version;
        self
    }

    pub fn at(mut self, secs: i64) -> Self {
        self.entity.timestamp = Some(at(secs));
        self.entity.last_modified = Some(at(secs));
        self
    }

    pub fn deleted_at(mut self, secs: i64) -> Self {
        self.entity.deleted_at = Some(at(secs));
        self
    }

    pub fn build(self) -> Entity {
        self.entity
    }
}

/// Wraps a remote and fails a configurable number of upcoming calls with
/// `RemoteError::Unavailable`.
pub struct FlakyRemote<R> {
    inner: R,
    fetch_failures: AtomicU32,
    put_failures: AtomicU32,
    fetch_attempts: AtomicU64,
    put_attempts: AtomicU64
}

impl<R: RemoteStore> FlakyRemote<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fetch_failures: AtomicU32::new(0),
            put_failures: AtomicU32::new(0),
            fetch_attempts: AtomicU64::new(0),
            put_attempts: AtomicU64::new(0)
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_puts(&self, count: u32) {
        self.put_failures.store(count, Ordering::SeqCst);
    }

    pub fn fetch_attempts(&self) -> u64 {
        self.fetch_attempts.load(Ordering::SeqCst)
    }

    pub fn put_attempts(&self) -> u64 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<R: RemoteStore> RemoteStore for FlakyRemote<R> {
    async fn fetch_all(&self) -> Result<RemoteTree, RemoteError> {
        self.fetch_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fetch_failures) {
            tracing::debug!("Injected fetch failure");
            return Err(RemoteError::unavailable("injected fetch failure"));
        }
        self.inner.fetch_all().await
    }

    async fn put_entity(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), RemoteError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.put_failures) {
            tracing::debug!(collection = %collection, key, "Injected put failure");
            return Err(RemoteError::unavailable("injected put failure"));
        }
        self.inner.put_entity(collection, key, value).await
    }

    async fn remove_entity(&self, collection: Collection, key: &str) -> Result<(), RemoteError> {
        self.inner.remove_entity(collection, key).await
    }

    async fn subscribe(
        &self,
        collection: Collection,
        callback: ChangeCallback,
    ) -> Result<Subscription, RemoteError> {
        self.inner.subscribe(collection, callback).await
    }
}
