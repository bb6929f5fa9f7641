//! Seams between the sync core and its external collaborators

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use errors::{MirrorError, RemoteError};
use serde_json::Value;

use crate::tree::RemoteTree;
use crate::types::Collection;

/// Invoked with the full current value of a collection on every change.
pub type ChangeCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Hosted document store.
///
/// Keys passed in are already sanitized. No retry happens at this layer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whole-tree snapshot.
    async fn fetch_all(&self) -> Result<RemoteTree, RemoteError>;

    /// Full-document overwrite at `collection/key`.
    async fn put_entity(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), RemoteError>;

    async fn remove_entity(&self, collection: Collection, key: &str) -> Result<(), RemoteError>;

    /// Registers `callback`, which fires once right away with the current
    /// value and then on every change until the returned handle is disposed.
    async fn subscribe(
        &self,
        collection: Collection,
        callback: ChangeCallback,
    ) -> Result<Subscription, RemoteError>;
}

/// Durable local key-value mirror holding one string document per name.
pub trait LocalMirror: Send + Sync {
    /// `Ok(None)` when nothing was stored under `name`.
    fn read(&self, name: &str) -> Result<Option<String>, MirrorError>;

    fn write(&self, name: &str, contents: &str) -> Result<(), MirrorError>;

    fn remove(&self, name: &str) -> Result<(), MirrorError>;
}

/// Disposer returned by [`RemoteStore::subscribe`]. Dropping it disposes too.
pub struct Subscription {
    collection: Collection,
    disposer: Option<Box<dyn FnOnce() + Send>>
}

impl Subscription {
    pub fn new(collection: Collection, disposer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            collection,
            disposer: Some(Box::new(disposer))
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn is_active(&self) -> bool {
        self.disposer.is_some()
    }

    pub fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispose_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = Subscription::new(Collection::Projects, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.dispose();
        sub.dispose();
        assert!(!sub.is_active());
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_disposes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(Collection::Notes, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
