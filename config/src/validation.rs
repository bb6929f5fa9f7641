//! # Configuration Validation
//!
//! Validates every section with the `validator` crate.

use crate::config::Config;
use validator::Validate;

/// Validate configuration structure.
///
/// ## Validation Rules
/// ### Remote
/// - `base_url`: http(s) URL, 1-2048 characters
/// - `timeout_seconds`: 1-300
///
/// ### Sync
/// - `poll_interval_seconds`: 5-3600
/// - `pull_freshness_seconds`: 0-600
/// - `push_retry_attempts`: 0-10
/// - `push_retry_base_ms`: 10-60000
///
/// ### Mirror
/// - `path`: non-empty
/// - `quota_bytes`: at least 1 when set
///
/// ### Workspace
/// - `team`: at least one member
/// - `max_submission_images`: 1-20
/// - `change_log_cap`: 1-500
///
/// ### Observability
/// - `logging_level`: must be "trace", "debug", "info", "warn", or "error"
pub fn validate(config: &Config) -> Result<(), validator::ValidationErrors> {
    config.validate()
}
