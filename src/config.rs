//! # Server Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [auth]
//! jwt_secret = "change-me"
//! jwt_expiration_secs = 3600
//!
//! [revocation]
//! capacity_bits = 10000
//! hash_count = 3
//!
//! [cache]
//! ttl_ms = 60000
//! ```
//!
//! Every section and field is optional. `TASKBOARD_JWT_SECRET` and
//! `TASKBOARD_JWT_EXPIRATION` override the `[auth]` values.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub revocation: RevocationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiration_secs: default_jwt_expiration_secs(),
        }
    }
}

/// Revocation filter sizing. See `web::revocation_filter` for the trade-off.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RevocationConfig {
    #[serde(default = "default_capacity_bits")]
    pub capacity_bits: usize,
    #[serde(default = "default_hash_count")]
    pub hash_count: u32,
    /// Fill ratio at which a saturation warning is logged.
    #[serde(default = "default_saturation_warning")]
    pub saturation_warning: f64,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            capacity_bits: default_capacity_bits(),
            hash_count: default_hash_count(),
            saturation_warning: default_saturation_warning(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: default_ttl_ms() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Queue depth per subscriber; a full queue drops the subscriber.
    #[serde(default = "default_notifier_buffer")]
    pub buffer: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { buffer: default_notifier_buffer() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.revocation.capacity_bits == 0 {
            return Err(ConfigError::Invalid("revocation.capacity_bits must be > 0".to_string()));
        }
        if self.revocation.hash_count == 0 {
            return Err(ConfigError::Invalid("revocation.hash_count must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.revocation.saturation_warning) {
            return Err(ConfigError::Invalid(
                "revocation.saturation_warning must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.notifier.buffer == 0 {
            return Err(ConfigError::Invalid("notifier.buffer must be > 0".to_string()));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Applies `TASKBOARD_JWT_SECRET` / `TASKBOARD_JWT_EXPIRATION` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("TASKBOARD_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(expiration) = lookup("TASKBOARD_JWT_EXPIRATION").and_then(|s| s.parse().ok()) {
            self.auth.jwt_expiration_secs = expiration;
        }
    }
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_jwt_secret() -> String { "taskboard_dev_secret_change_me".to_string() }
fn default_jwt_expiration_secs() -> u64 { 3600 }
fn default_capacity_bits() -> usize { 10_000 }
fn default_hash_count() -> u32 { 3 }
fn default_saturation_warning() -> f64 { 0.5 }
fn default_ttl_ms() -> u64 { 60_000 }
fn default_notifier_buffer() -> usize { 32 }
fn default_log_level() -> String { "info".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
