use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KxError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KxConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

/// Defaults for ad hoc lock acquisition from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub wait_timeout_secs: i64,
    #[serde(default = "default_lock_expire_secs")]
    pub expire_secs: i64,
    #[serde(default = "default_lock_poll_interval_micros")]
    pub poll_interval_micros: u64,
}

/// Parameters of the lock every queue operation takes on `Queue:<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_lock_lifetime_secs")]
    pub lock_lifetime_secs: i64,
    #[serde(default = "default_queue_poll_interval_micros")]
    pub poll_interval_micros: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_lock_expire_secs() -> i64 {
    15
}

fn default_lock_poll_interval_micros() -> u64 {
    100_000
}

fn default_queue_lock_lifetime_secs() -> i64 {
    15
}

fn default_queue_poll_interval_micros() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 0,
            expire_secs: default_lock_expire_secs(),
            poll_interval_micros: default_lock_poll_interval_micros(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock_lifetime_secs: default_queue_lock_lifetime_secs(),
            poll_interval_micros: default_queue_poll_interval_micros(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for KxConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl KxConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            store: StoreConfig::default(),
            lock: LockConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.redis_url.trim().is_empty() {
            return Err(KxError::Config("store.redis_url must not be empty".to_string()));
        }
        if self.lock.expire_secs <= 0 {
            return Err(KxError::Config(format!(
                "lock.expire_secs must be > 0, got {}",
                self.lock.expire_secs
            )));
        }
        if self.queue.lock_lifetime_secs <= 0 {
            return Err(KxError::Config(format!(
                "queue.lock_lifetime_secs must be > 0, got {}",
                self.queue.lock_lifetime_secs
            )));
        }
        Ok(())
    }
}
