//! # Environment Variable Loader
//!
//! Loads configuration from environment variables.
//!
//! # Naming Convention
//! - `RM_*`: Remote store settings
//! - `SY_*`: Sync settings
//! - `LM_*`: Local mirror settings
//! - `WS_*`: Workspace settings
//! - `OB_*`: Observability settings

use crate::config::{
    Config, MirrorConfig, ObservabilityConfig, RemoteConfig, SyncConfig, WorkspaceConfig,
};
use std::env;

/// Load configuration from environment variables.
///
/// Unset variables keep their defaults. A variable that is set but does not
/// parse is an error.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Remote store: {}", config.remote.base_url);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// - `RM_BASE_URL`, `RM_AUTH_TOKEN`, `RM_TIMEOUT_SECONDS`, `RM_LIVE_UPDATES`
/// - `SY_POLL_INTERVAL_SECONDS`, `SY_PULL_FRESHNESS_SECONDS`,
///   `SY_PUSH_RETRY_ATTEMPTS`, `SY_PUSH_RETRY_BASE_MS`
/// - `LM_PATH`, `LM_QUOTA_BYTES`
/// - `WS_TEAM` (comma separated), `WS_DEFAULT_AUTHOR`,
///   `WS_MAX_SUBMISSION_IMAGES`
/// - `OB_LOGGING_LEVEL`, `OB_METRICS_ENABLED`
pub fn load_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config {
        remote: load_remote_from_env()?,
        sync: load_sync_from_env()?,
        mirror: load_mirror_from_env()?,
        workspace: load_workspace_from_env()?,
        observability: load_observability_from_env()?,
    };

    Ok(config)
}

fn load_remote_from_env() -> Result<RemoteConfig, Box<dyn std::error::Error>> {
    let defaults = RemoteConfig::default();
    Ok(RemoteConfig {
        base_url: env::var("RM_BASE_URL").unwrap_or(defaults.base_url),
        auth_token: env::var("RM_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
        timeout_seconds: parse_env_or("RM_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
        live_updates: parse_bool_or("RM_LIVE_UPDATES", defaults.live_updates),
    })
}

fn load_sync_from_env() -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let defaults = SyncConfig::default();
    Ok(SyncConfig {
        poll_interval_seconds: parse_env_or(
            "SY_POLL_INTERVAL_SECONDS",
            defaults.poll_interval_seconds,
        )?,
        pull_freshness_seconds: parse_env_or(
            "SY_PULL_FRESHNESS_SECONDS",
            defaults.pull_freshness_seconds,
        )?,
        push_retry_attempts: parse_env_or("SY_PUSH_RETRY_ATTEMPTS", defaults.push_retry_attempts)?,
        push_retry_base_ms: parse_env_or("SY_PUSH_RETRY_BASE_MS", defaults.push_retry_base_ms)?,
    })
}

fn load_mirror_from_env() -> Result<MirrorConfig, Box<dyn std::error::Error>> {
    let defaults = MirrorConfig::default();
    let quota_bytes = match env::var("LM_QUOTA_BYTES") {
        Ok(raw) => Some(raw.trim().parse::<u64>()?),
        Err(_) => defaults.quota_bytes,
    };
    Ok(MirrorConfig {
        path: env::var("LM_PATH").unwrap_or(defaults.path),
        quota_bytes,
    })
}

fn load_workspace_from_env() -> Result<WorkspaceConfig, Box<dyn std::error::Error>> {
    let defaults = WorkspaceConfig::default();
    let team = match env::var("WS_TEAM") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => defaults.team,
    };
    Ok(WorkspaceConfig {
        team,
        default_author: env::var("WS_DEFAULT_AUTHOR").ok().or(defaults.default_author),
        max_submission_images: parse_env_or(
            "WS_MAX_SUBMISSION_IMAGES",
            defaults.max_submission_images,
        )?,
        change_log_cap: defaults.change_log_cap,
    })
}

fn load_observability_from_env() -> Result<ObservabilityConfig, Box<dyn std::error::Error>> {
    let defaults = ObservabilityConfig::default();
    Ok(ObservabilityConfig {
        logging_level: env::var("OB_LOGGING_LEVEL").unwrap_or(defaults.logging_level),
        metrics_enabled: parse_bool_or("OB_METRICS_ENABLED", defaults.metrics_enabled),
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(s) => s
            .trim()
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>),
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if env::var_os(key).is_none() {
        return Ok(default);
    }
    parse_env(key)
}

fn parse_bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 15] = [
        "RM_BASE_URL",
        "RM_AUTH_TOKEN",
        "RM_TIMEOUT_SECONDS",
        "RM_LIVE_UPDATES",
        "SY_POLL_INTERVAL_SECONDS",
        "SY_PULL_FRESHNESS_SECONDS",
        "SY_PUSH_RETRY_ATTEMPTS",
        "SY_PUSH_RETRY_BASE_MS",
        "LM_PATH",
        "LM_QUOTA_BYTES",
        "WS_TEAM",
        "WS_DEFAULT_AUTHOR",
        "WS_MAX_SUBMISSION_IMAGES",
        "OB_LOGGING_LEVEL",
        "OB_METRICS_ENABLED",
    ];

    fn clear_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_from_env_defaults() {
        clear_vars();
        let config = load_from_env().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_load_from_env_overrides() {
        clear_vars();
        unsafe {
            env::set_var("RM_BASE_URL", "https://review.firebaseio.com");
            env::set_var("RM_LIVE_UPDATES", "false");
            env::set_var("SY_POLL_INTERVAL_SECONDS", "60");
            env::set_var("LM_QUOTA_BYTES", "5242880");
            env::set_var("WS_TEAM", "Ash, Jason ,");
        }

        let config = load_from_env().unwrap();
        assert_eq!(config.remote.base_url, "https://review.firebaseio.com");
        assert!(!config.remote.live_updates);
        assert_eq!(config.sync.poll_interval_seconds, 60);
        assert_eq!(config.mirror.quota_bytes, Some(5_242_880));
        assert_eq!(config.workspace.team, vec!["Ash", "Jason"]);

        clear_vars();
    }

    #[test]
    #[serial]
    fn test_load_from_env_rejects_bad_number() {
        clear_vars();
        unsafe {
            env::set_var("RM_TIMEOUT_SECONDS", "soon");
        }
        assert!(load_from_env().is_err());
        clear_vars();
    }

    #[test]
    fn test_parse_env_missing() {
        let result: Result<u32, _> = parse_env("NONEXISTENT_PR_VAR");
        assert!(result.is_err());
    }
}
