//! # Project Review Sync
//!
//! Offline-first sync between a local entity store and a hosted document
//! store shared by every writer.
//!
//! - `merge`: last-writer-wins reconciliation with tombstones
//! - `store`: in-memory state mirrored to durable local documents
//! - `orchestrator`: cold load, pulls, pushes and the sync gate
//! - `live_updates`: subscription pump for remotes that push changes
//! - `workspace`: the mutations and queries a presentation layer calls

pub mod change_log;
pub mod error;
pub mod events;
pub mod image_cache;
pub mod key_registry;
pub mod live_updates;
pub mod merge;
pub mod migrate;
pub mod orchestrator;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod workspace;

pub use error::{Result, SyncError};
pub use events::StoreEvent;
pub use live_updates::LiveUpdates;
pub use merge::{MergeOutcome, MergeReport, Winner, merge, resolve};
pub use orchestrator::{OrchestratorOptions, PollingHandle, SyncOrchestrator};
pub use state::{LoadSource, PullMode, PullOutcome, PullSummary, PushOutcome, SyncStats};
pub use store::{EntityStore, PersistOutcome};
pub use telemetry::{SyncTelemetry, init_logging};
pub use workspace::{NewFeedback, NewProject, PurgeSummary, Workspace, WorkspaceError};

#[cfg(test)]
mod proptests;
