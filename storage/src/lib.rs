//! # Storage Layer
//!
//! Durable local mirrors and hosted document store adapters.

pub mod firebase;
pub mod memory_remote;
pub mod mirror;

pub use firebase::FirebaseRemote;
pub use memory_remote::InMemoryRemote;
pub use mirror::{FileMirror, MemoryMirror};
