use kx_common::config::KxConfig;
use kx_common::KxError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_load_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("kx.toml");

    let config_content = r#"
[store]
redis_url = "redis://cache.internal:6380/2"

[lock]
wait_timeout_secs = 3
expire_secs = 30
poll_interval_micros = 50000

[queue]
lock_lifetime_secs = 20
poll_interval_micros = 500

[logging]
level = "debug"
"#;

    fs::write(&config_path, config_content).unwrap();

    let config = KxConfig::from_file(&config_path).unwrap();

    assert_eq!(config.store.redis_url, "redis://cache.internal:6380/2");
    assert_eq!(config.lock.wait_timeout_secs, 3);
    assert_eq!(config.lock.expire_secs, 30);
    assert_eq!(config.lock.poll_interval_micros, 50_000);
    assert_eq!(config.queue.lock_lifetime_secs, 20);
    assert_eq!(config.queue.poll_interval_micros, 500);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_config_missing_sections_use_defaults() {
    let config = KxConfig::from_toml_str(
        r#"
[store]
redis_url = "redis://localhost:6379"
"#,
    )
    .unwrap();

    assert_eq!(config.store.redis_url, "redis://localhost:6379");
    assert_eq!(config.lock.expire_secs, 15);
    assert_eq!(config.lock.wait_timeout_secs, 0);
    assert_eq!(config.queue.lock_lifetime_secs, 15);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_config_empty_document_is_default() {
    let config = KxConfig::from_toml_str("").unwrap();
    let defaults = KxConfig::default_config();

    assert_eq!(config.store.redis_url, defaults.store.redis_url);
    assert_eq!(config.queue.poll_interval_micros, defaults.queue.poll_interval_micros);
}

#[test]
fn test_config_validation_rejects_zero_queue_lock_lifetime() {
    let result = KxConfig::from_toml_str(
        r#"
[queue]
lock_lifetime_secs = 0
"#,
    );

    assert!(matches!(result, Err(KxError::Config(_))));
}

#[test]
fn test_config_validation_rejects_empty_redis_url() {
    let result = KxConfig::from_toml_str(
        r#"
[store]
redis_url = "  "
"#,
    );

    assert!(matches!(result, Err(KxError::Config(_))));
}

#[test]
fn test_config_malformed_toml_is_config_error() {
    let result = KxConfig::from_toml_str("[store\nredis_url = ");
    assert!(matches!(result, Err(KxError::Config(_))));
}

#[test]
fn test_config_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = KxConfig::from_file(temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(KxError::Io(_))));
}
