use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry budget for interactive operations (creates, updates, notes).
    /// Bulk chunks carry their own, lower budget.
    pub max_retries: u32,
    /// Linear backoff step: attempt `n` is re-scheduled `n * base_delay`
    /// after its failure.
    #[serde(with = "super::serde_helpers")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long a graceful shutdown may spend draining the queue before
    /// abandoning what remains.
    #[serde(with = "super::serde_helpers")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}
