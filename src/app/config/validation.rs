use super::settings::DispatchConfig;
use super::ConfigError;
use url::Url;

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate endpoint URL
        Url::parse(&self.client.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid endpoint URL '{}': {}",
                self.client.endpoint, e
            ))
        })?;

        // Validate batch size
        if self.batch.max_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        // Validate queue capacity
        if self.queue_capacity < self.batch.max_size {
            return Err(ConfigError::InvalidConfig(format!(
                "Queue capacity ({}) must be at least as large as batch size ({})",
                self.queue_capacity, self.batch.max_size
            )));
        }

        if self.batch.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Flush interval must be greater than 0".to_string(),
            ));
        }

        // Validate retry config
        if self.retry.max_retries == 0 {
            return Err(ConfigError::InvalidConfig(
                "Retry budget must be greater than 0".to_string(),
            ));
        }

        // Validate bulk config
        if self.bulk.chunk_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Bulk chunk size must be greater than 0".to_string(),
            ));
        }

        // Validate catch-up config
        if self.catch_up.enabled {
            if self.catch_up.scan_limit == 0 {
                return Err(ConfigError::InvalidConfig(
                    "Catch-up scan limit must be greater than 0".to_string(),
                ));
            }
            if self.catch_up.interval.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "Catch-up interval must be greater than 0".to_string(),
                ));
            }
        }

        // Validate timeouts
        if self.client.timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.shutdown.drain_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Drain timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
