use config::{Config, load};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn clear_env() {
    unsafe {
        for var in [
            "RM_BASE_URL",
            "SY_POLL_INTERVAL_SECONDS",
            "WS_MAX_SUBMISSION_IMAGES",
            "OB_LOGGING_LEVEL",
        ] {
            std::env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_file_then_env_then_overrides() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("review.toml");
    fs::write(
        &path,
        r#"
[remote]
base_url = "https://from-file.firebaseio.com"

[sync]
poll_interval_seconds = 90
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("SY_POLL_INTERVAL_SECONDS", "15");
    }

    let mut overrides = Config::default();
    overrides.observability.logging_level = "debug".to_string();

    let config = load(Some(&path), Some(overrides)).unwrap();
    assert_eq!(config.remote.base_url, "https://from-file.firebaseio.com");
    assert_eq!(config.sync.poll_interval_seconds, 15);
    assert_eq!(config.observability.logging_level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_merged_config_is_rejected() {
    clear_env();
    unsafe {
        std::env::set_var("WS_MAX_SUBMISSION_IMAGES", "50");
    }

    assert!(load(None, None).is_err());

    clear_env();
}
