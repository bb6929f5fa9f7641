//! # Project Review Errors
//!
//! Structured error types shared by the storage adapters and the sync core.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields on every variant so logs carry context

use thiserror::Error;

/// Errors raised by a hosted document store adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network, transport or authentication failure. Never retried at the
    /// adapter layer.
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Remote store rejected {path} with status {status}: {body}")]
    Rejected {
        path: String,
        status: u16,
        body: String
    },

    #[error("Malformed remote document at {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("Invalid remote key: {key}")]
    InvalidKey { key: String },

    #[error("Invalid remote endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String }
}

impl RemoteError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors raised by a durable local mirror.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Storage quota exceeded writing {name}: needed {needed} bytes, {available} available")]
    QuotaExceeded {
        name: String,
        needed: u64,
        available: u64
    },

    #[error("Mirror IO on {name} failed: {reason}")]
    Io { name: String, reason: String },

    #[error("Mirror serialization failed: {reason}")]
    Serialization { reason: String }
}

impl MirrorError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
