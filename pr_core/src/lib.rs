//! # Project Review Core
//!
//! Shared types, traits, and time helpers for the project review system.
//!
//! This crate provides:
//! - The entity model synced between writers (projects and feedback)
//! - Per-project channels (tasks, notes) and the local change log
//! - The whole-tree snapshot shape returned by the hosted store
//! - The `RemoteStore`, `LocalMirror` and `Clock` seams

pub mod time;
pub mod traits;
pub mod tree;
pub mod types;

pub use time::{Clock, SystemClock, Timestamp};
pub use traits::{ChangeCallback, LocalMirror, RemoteStore, Subscription};
pub use tree::RemoteTree;
pub use types::{
    ChangeAction, ChangeLogEntry, Collection, Entity, EntityKind, FeedbackFields, ImageRef,
    NoteDoc, ProjectFields, ProjectStatus, Task, TaskList
};
