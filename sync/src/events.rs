use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Change notifications for whatever presentation layer is listening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    /// Everything may have changed, as after a cold load.
    Reloaded,
    ProjectsChanged,
    FeedbackChanged,
    #[serde(rename_all = "camelCase")]
    TasksChanged { key: String },
    #[serde(rename_all = "camelCase")]
    NotesChanged { key: String },
    #[serde(rename_all = "camelCase")]
    ChangeLogged { key: String }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Returns how many listeners received the event.
    pub fn emit(&self, event: StoreEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "No listeners for store event");
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
