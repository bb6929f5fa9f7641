//! Live-update delivery.
//!
//! One subscription per collection feeds a channel drained by a single task,
//! so deliveries are applied in arrival order. The first delivery of each
//! collection carries the value at registration time: it updates state but
//! emits no change events, and neither does anything before data is loaded.

use std::collections::HashSet;
use std::sync::Arc;

use pr_core::{ChangeCallback, Collection, RemoteTree, Subscription};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::orchestrator::SyncOrchestrator;

/// Disposes every subscription and stops the pump when dropped.
pub struct LiveUpdates {
    subscriptions: Vec<Subscription>,
    pump: JoinHandle<()>
}

impl LiveUpdates {
    pub fn collections(&self) -> Vec<Collection> {
        self.subscriptions.iter().map(Subscription::collection).collect()
    }

    pub fn is_active(&self) -> bool {
        !self.pump.is_finished() && self.subscriptions.iter().all(Subscription::is_active)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.dispose();
        }
        self.pump.abort();
    }
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn single_collection_tree(collection: Collection, value: Value) -> RemoteTree {
    let mut root = Map::new();
    root.insert(collection.as_str().to_string(), value);
    RemoteTree::from_json(&Value::Object(root))
}

impl SyncOrchestrator {
    /// Subscribes to every collection. Fails if any subscription fails, in
    /// which case the ones already made are disposed.
    #[tracing::instrument(skip(self))]
    pub async fn start_live_updates(&self) -> Result<LiveUpdates> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Collection, Value)>();

        let this = self.clone();
        let pump = tokio::spawn(async move {
            let mut seen = HashSet::new();
            while let Some((collection, value)) = rx.recv().await {
                let first = seen.insert(collection);
                this.apply_delivery(collection, value, first);
            }
            debug!("Live update channel closed");
        });

        let mut subscriptions = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let sender = tx.clone();
            let callback: ChangeCallback = Arc::new(move |value| {
                if sender.send((collection, value)).is_err() {
                    debug!(collection = %collection, "Dropping delivery after shutdown");
                }
            });
            match self.shared_remote().subscribe(collection, callback).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    warn!(collection = %collection, error = %err, "Live subscription failed");
                    for mut subscription in subscriptions {
                        subscription.dispose();
                    }
                    pump.abort();
                    return Err(err.into());
                }
            }
        }

        info!(collections = subscriptions.len(), "Live updates started");
        Ok(LiveUpdates {
            subscriptions,
            pump
        })
    }

    fn apply_delivery(&self, collection: Collection, value: Value, first: bool) {
        self.record_live_delivery(collection);
        let emit = !first && self.is_data_loaded();
        debug!(collection = %collection, first, emit, "Applying live delivery");
        self.apply_tree(single_collection_tree(collection, value), emit);
    }
}
