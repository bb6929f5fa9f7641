//! Shared test fixtures for the project review workspace.
//!
//! Provides:
//! - Builders for project and feedback entities with explicit sync fields
//! - A manually driven clock
//! - A remote wrapper that injects outages
//! - Process-unique names so parallel tests never share keys

mod fixtures;

pub use fixtures::*;
