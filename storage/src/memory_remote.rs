//! In-process stand-in for the hosted document store.
//!
//! Clones share one tree, so two handles behave like two writers talking to
//! the same database. Subscribers receive the full collection value right
//! after registering and again after every write to that collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use errors::RemoteError;
use parking_lot::Mutex;
use pr_core::{ChangeCallback, Collection, RemoteStore, RemoteTree, Subscription};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Default)]
struct Inner {
    collections: BTreeMap<Collection, Map<String, Value>>,
    subscribers: HashMap<u64, (Collection, ChangeCallback)>
}

#[derive(Clone)]
pub struct InMemoryRemote {
    inner: Arc<Mutex<Inner>>,
    available: Arc<AtomicBool>,
    next_subscriber: Arc<AtomicU64>,
    puts: Arc<AtomicU64>,
    fetches: Arc<AtomicU64>
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            available: Arc::new(AtomicBool::new(true)),
            next_subscriber: Arc::new(AtomicU64::new(1)),
            puts: Arc::new(AtomicU64::new(0)),
            fetches: Arc::new(AtomicU64::new(0))
        }
    }

    /// While unavailable every call fails with `RemoteError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn document(&self, collection: Collection, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(key).cloned())
    }

    pub fn keys(&self, collection: Collection) -> Vec<String> {
        self.inner
            .lock()
            .collections
            .get(&collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes a document without notifying subscribers.
    pub fn seed(&self, collection: Collection, key: &str, value: Value) {
        self.inner
            .lock()
            .collections
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::unavailable("in-memory remote is offline"))
        }
    }

    fn collection_value(inner: &Inner, collection: Collection) -> Value {
        match inner.collections.get(&collection) {
            Some(docs) if !docs.is_empty() => Value::Object(docs.clone()),
            _ => Value::Null
        }
    }

    /// Callbacks run after the lock is released so they may call back in.
    fn notify(&self, collection: Collection) {
        let (value, callbacks): (Value, Vec<ChangeCallback>) = {
            let inner = self.inner.lock();
            let callbacks = inner
                .subscribers
                .values()
                .filter(|(c, _)| *c == collection)
                .map(|(_, cb)| cb.clone())
                .collect();
            (Self::collection_value(&inner, collection), callbacks)
        };
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch_all(&self) -> Result<RemoteTree, RemoteError> {
        self.check_available()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let root = {
            let inner = self.inner.lock();
            let mut root = Map::new();
            for collection in Collection::ALL {
                root.insert(
                    collection.as_str().to_string(),
                    Self::collection_value(&inner, collection)
                );
            }
            Value::Object(root)
        };
        Ok(RemoteTree::from_json(&root))
    }

    async fn put_entity(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), RemoteError> {
        self.check_available()?;
        if !utils::is_valid_remote_key(key) {
            return Err(RemoteError::InvalidKey {
                key: key.to_string()
            });
        }
        self.seed(collection, key, value.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);
        debug!(collection = %collection, key, "In-memory put");
        self.notify(collection);
        Ok(())
    }

    async fn remove_entity(&self, collection: Collection, key: &str) -> Result<(), RemoteError> {
        self.check_available()?;
        let removed = self
            .inner
            .lock()
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(key))
            .is_some();
        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        callback: ChangeCallback,
    ) -> Result<Subscription, RemoteError> {
        self.check_available()?;
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let current = {
            let mut inner = self.inner.lock();
            inner.subscribers.insert(id, (collection, callback.clone()));
            Self::collection_value(&inner, collection)
        };
        callback(current);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(collection, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.remove(&id);
            }
        }))
    }
}
