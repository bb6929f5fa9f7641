//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. Explicit overrides (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)
//!
//! A source only overrides a field when its value differs from the default,
//! so a file that omits a section never resets what an earlier source set.

use crate::config::{
    Config, MirrorConfig, ObservabilityConfig, RemoteConfig, SyncConfig, WorkspaceConfig,
};
use std::fmt::Debug;

/// Merge multiple configuration sources with precedence.
///
/// ## Usage
/// ```rust,no_run
/// use config::{Config, merge_configs, load_from_file, load_from_env};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let from_file = load_from_file(Path::new("review.toml"))?;
///     let from_env = load_from_env()?;
///
///     let _config = merge_configs(Config::default(), from_file, "file", from_env, "env", None, "cli");
///     Ok(())
/// }
/// ```
pub fn merge_configs(
    defaults: Config,
    file_config: Config,
    file_source_name: &str,
    env_config: Config,
    env_source_name: &str,
    cli_config: Option<Config>,
    cli_source_name: &str,
) -> Config {
    let mut config = defaults;

    config = merge_with_logging(config, &file_config, file_source_name);
    config = merge_with_logging(config, &env_config, env_source_name);

    if let Some(cli) = cli_config {
        config = merge_with_logging(config, &cli, cli_source_name);
    }

    config
}

fn merge_with_logging(mut base: Config, override_config: &Config, source_name: &str) -> Config {
    let mut changes = Vec::new();

    merge_remote(&mut base.remote, &override_config.remote, &mut changes);
    merge_sync(&mut base.sync, &override_config.sync, &mut changes);
    merge_mirror(&mut base.mirror, &override_config.mirror, &mut changes);
    merge_workspace(&mut base.workspace, &override_config.workspace, &mut changes);
    merge_observability(
        &mut base.observability,
        &override_config.observability,
        &mut changes,
    );

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

/// Takes `candidate` when it is not the default and differs from `base`.
fn apply<T>(base: &mut T, candidate: &T, default: &T, path: &str, changes: &mut Vec<String>)
where
    T: PartialEq + Clone + Debug,
{
    if candidate != default && candidate != base {
        changes.push(format!("{path} = {candidate:?}"));
        base.clone_from(candidate);
    }
}

fn merge_remote(base: &mut RemoteConfig, over: &RemoteConfig, changes: &mut Vec<String>) {
    let d = RemoteConfig::default();
    apply(&mut base.base_url, &over.base_url, &d.base_url, "remote.base_url", changes);
    if over.auth_token.is_some() && over.auth_token != base.auth_token {
        changes.push("remote.auth_token = ***".to_string());
        base.auth_token.clone_from(&over.auth_token);
    }
    apply(
        &mut base.timeout_seconds,
        &over.timeout_seconds,
        &d.timeout_seconds,
        "remote.timeout_seconds",
        changes,
    );
    apply(
        &mut base.live_updates,
        &over.live_updates,
        &d.live_updates,
        "remote.live_updates",
        changes,
    );
}

fn merge_sync(base: &mut SyncConfig, over: &SyncConfig, changes: &mut Vec<String>) {
    let d = SyncConfig::default();
    apply(
        &mut base.poll_interval_seconds,
        &over.poll_interval_seconds,
        &d.poll_interval_seconds,
        "sync.poll_interval_seconds",
        changes,
    );
    apply(
        &mut base.pull_freshness_seconds,
        &over.pull_freshness_seconds,
        &d.pull_freshness_seconds,
        "sync.pull_freshness_seconds",
        changes,
    );
    apply(
        &mut base.push_retry_attempts,
        &over.push_retry_attempts,
        &d.push_retry_attempts,
        "sync.push_retry_attempts",
        changes,
    );
    apply(
        &mut base.push_retry_base_ms,
        &over.push_retry_base_ms,
        &d.push_retry_base_ms,
        "sync.push_retry_base_ms",
        changes,
    );
}

fn merge_mirror(base: &mut MirrorConfig, over: &MirrorConfig, changes: &mut Vec<String>) {
    let d = MirrorConfig::default();
    apply(&mut base.path, &over.path, &d.path, "mirror.path", changes);
    apply(
        &mut base.quota_bytes,
        &over.quota_bytes,
        &d.quota_bytes,
        "mirror.quota_bytes",
        changes,
    );
}

fn merge_workspace(base: &mut WorkspaceConfig, over: &WorkspaceConfig, changes: &mut Vec<String>) {
    let d = WorkspaceConfig::default();
    apply(&mut base.team, &over.team, &d.team, "workspace.team", changes);
    apply(
        &mut base.default_author,
        &over.default_author,
        &d.default_author,
        "workspace.default_author",
        changes,
    );
    apply(
        &mut base.max_submission_images,
        &over.max_submission_images,
        &d.max_submission_images,
        "workspace.max_submission_images",
        changes,
    );
    apply(
        &mut base.change_log_cap,
        &over.change_log_cap,
        &d.change_log_cap,
        "workspace.change_log_cap",
        changes,
    );
}

fn merge_observability(
    base: &mut ObservabilityConfig,
    over: &ObservabilityConfig,
    changes: &mut Vec<String>,
) {
    let d = ObservabilityConfig::default();
    apply(
        &mut base.logging_level,
        &over.logging_level,
        &d.logging_level,
        "observability.logging_level",
        changes,
    );
    apply(
        &mut base.metrics_enabled,
        &over.metrics_enabled,
        &d.metrics_enabled,
        "observability.metrics_enabled",
        changes,
    );
}
