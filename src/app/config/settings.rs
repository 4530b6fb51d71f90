use super::groups::{RetryConfig, ShutdownConfig};
use super::serde_helpers::{
    load_env_millis, load_env_secs, load_env_string, load_env_var,
};
use super::{ConfigError, LogLevel};
use crate::dispatch::batch::BatchConfig;
use crate::dispatch::bulk::BulkConfig;
use crate::dispatch::rate_limit::RateLimitConfig;
use crate::sender::ClientConfig;
use crate::sync::CatchUpConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full dispatcher configuration.
///
/// Defaults mirror the production constants: queue of 1000 operations,
/// batches of 10, one CRM call per second, three retries at a 30-second
/// linear base delay, bulk chunks of 50 staggered 5 seconds apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of the in-memory operation queue.
    pub queue_capacity: usize,
    pub log_level: LogLevel,
    pub batch: BatchConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub bulk: BulkConfig,
    pub catch_up: CatchUpConfig,
    pub shutdown: ShutdownConfig,
    pub client: ClientConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            log_level: LogLevel::default(),
            batch: BatchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            bulk: BulkConfig::default(),
            catch_up: CatchUpConfig::default(),
            shutdown: ShutdownConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Loads configuration from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        load_env_string("CRM_ENDPOINT", &mut config.client.endpoint);
        load_env_string("CRM_API_TOKEN", &mut config.client.api_key);
        load_env_var("QUEUE_CAPACITY", &mut config.queue_capacity)?;
        load_env_var("BATCH_SIZE", &mut config.batch.max_size)?;
        load_env_millis("FLUSH_INTERVAL_MS", &mut config.batch.flush_interval)?;
        load_env_millis("RATE_LIMIT_INTERVAL_MS", &mut config.rate_limit.min_interval)?;
        load_env_var("MAX_RETRIES", &mut config.retry.max_retries)?;
        load_env_secs("RETRY_BASE_DELAY_SECS", &mut config.retry.base_delay)?;
        load_env_var("BULK_CHUNK_SIZE", &mut config.bulk.chunk_size)?;
        load_env_secs("BULK_STAGGER_SECS", &mut config.bulk.stagger)?;
        load_env_var("BULK_MAX_RETRIES", &mut config.bulk.max_retries)?;
        load_env_var("CATCH_UP_ENABLED", &mut config.catch_up.enabled)?;
        load_env_secs("CATCH_UP_INTERVAL_SECS", &mut config.catch_up.interval)?;
        load_env_var("CATCH_UP_SCAN_LIMIT", &mut config.catch_up.scan_limit)?;
        load_env_secs("DRAIN_TIMEOUT_SECS", &mut config.shutdown.drain_timeout)?;
        load_env_secs("REQUEST_TIMEOUT_SECS", &mut config.client.timeout)?;
        load_env_var("MAX_CONNECTIONS", &mut config.client.max_connections)?;

        // LogLevel requires special handling for case-insensitive parsing
        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.log_level = match log_level.to_lowercase().as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" => LogLevel::Trace,
                _ => {
                    return Err(ConfigError::EnvError(format!(
                        "Invalid LOG_LEVEL: {log_level}"
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
