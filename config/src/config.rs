//! # Configuration Structures
//!
//! All configuration structures use `serde` for (de)serialization and
//! `validator` for range checks. Every section can be omitted from a file and
//! falls back to its defaults.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level configuration for the project review sync client.
///
/// ## Usage
/// ```rust,no_run
/// use config::Config;
///
/// let config = Config::default();
/// println!("Remote store: {}", config.remote.base_url);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct Config {
    /// Hosted document store connection
    #[serde(default)]
    #[validate(nested)]
    pub remote: RemoteConfig,

    /// Pull/push scheduling and retry policy
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncConfig,

    /// Durable local mirror
    #[serde(default)]
    #[validate(nested)]
    pub mirror: MirrorConfig,

    /// Team and submission rules
    #[serde(default)]
    #[validate(nested)]
    pub workspace: WorkspaceConfig,

    /// Logging and metrics
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

/// Hosted document store connection.
///
/// ## Fields
/// - `base_url`: Root URL of the realtime database (default:
///   "http://localhost:9000")
/// - `auth_token`: Optional database secret appended as `?auth=`
/// - `timeout_seconds`: Request timeout (default: 30, range: 1-300)
/// - `live_updates`: Use subscriptions instead of polling (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_base_url")]
    #[validate(length(min = 1, max = 2048), custom(function = "validate_base_url"))]
    pub base_url: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_remote_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    #[serde(default = "default_remote_live_updates")]
    pub live_updates: bool
}

fn default_remote_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_remote_timeout() -> u64 {
    30
}

fn default_remote_live_updates() -> bool {
    true
}

fn validate_base_url(value: &str) -> Result<(), validator::ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(validator::ValidationError::new("Base URL must be http(s)"))
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            auth_token: None,
            timeout_seconds: default_remote_timeout(),
            live_updates: default_remote_live_updates()
        }
    }
}

/// Sync scheduling.
///
/// ## Fields
/// - `poll_interval_seconds`: Timer pull interval when live updates are off
///   (default: 30, range: 5-3600)
/// - `pull_freshness_seconds`: Silent pulls inside this window after a
///   successful pull are skipped (default: 5, range: 0-600)
/// - `push_retry_attempts`: Retries after a failed push (default: 3,
///   range: 0-10)
/// - `push_retry_base_ms`: First backoff delay (default: 200, range:
///   10-60000)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 5, max = 3600))]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_pull_freshness")]
    #[validate(range(min = 0, max = 600))]
    pub pull_freshness_seconds: u64,

    #[serde(default = "default_push_retry_attempts")]
    #[validate(range(min = 0, max = 10))]
    pub push_retry_attempts: u32,

    #[serde(default = "default_push_retry_base_ms")]
    #[validate(range(min = 10, max = 60000))]
    pub push_retry_base_ms: u64
}

fn default_poll_interval() -> u64 {
    30
}

fn default_pull_freshness() -> u64 {
    5
}

fn default_push_retry_attempts() -> u32 {
    3
}

fn default_push_retry_base_ms() -> u64 {
    200
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            pull_freshness_seconds: default_pull_freshness(),
            push_retry_attempts: default_push_retry_attempts(),
            push_retry_base_ms: default_push_retry_base_ms()
        }
    }
}

/// Durable local mirror.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MirrorConfig {
    /// Directory holding one file per mirror document
    #[serde(default = "default_mirror_path")]
    #[validate(length(min = 1))]
    pub path: String,

    /// Total byte budget across all documents, unlimited when absent
    #[serde(default)]
    #[validate(range(min = 1))]
    pub quota_bytes: Option<u64>
}

fn default_mirror_path() -> String {
    ".project-review".to_string()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            path: default_mirror_path(),
            quota_bytes: None
        }
    }
}

/// Team and submission rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct WorkspaceConfig {
    /// Task assignees
    #[serde(default = "default_team")]
    #[validate(length(min = 1))]
    pub team: Vec<String>,

    /// Author recorded on change log entries until one is selected
    #[serde(default)]
    pub default_author: Option<String>,

    #[serde(default = "default_max_submission_images")]
    #[validate(range(min = 1, max = 20))]
    pub max_submission_images: usize,

    #[serde(default = "default_change_log_cap")]
    #[validate(range(min = 1, max = 500))]
    pub change_log_cap: usize
}

fn default_team() -> Vec<String> {
    vec!["Jason".to_string(), "Ash".to_string()]
}

fn default_max_submission_images() -> usize {
    3
}

fn default_change_log_cap() -> usize {
    50
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            team: default_team(),
            default_author: None,
            max_submission_images: default_max_submission_images(),
            change_log_cap: default_change_log_cap()
        }
    }
}

impl WorkspaceConfig {
    /// Configured default author, else the first team member.
    pub fn initial_author(&self) -> String {
        self.default_author
            .clone()
            .or_else(|| self.team.first().cloned())
            .unwrap_or_default()
    }
}

/// Observability configuration.
///
/// ## Fields
/// - `logging_level`: Log level (default: "info")
/// - `metrics_enabled`: Record sync metrics (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_observability_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String,

    #[serde(default = "default_observability_metrics_enabled")]
    pub metrics_enabled: bool
}

fn default_observability_logging_level() -> String {
    "info".to_string()
}

fn default_observability_metrics_enabled() -> bool {
    true
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging_level: default_observability_logging_level(),
            metrics_enabled: default_observability_metrics_enabled()
        }
    }
}
