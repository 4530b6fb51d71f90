use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum interval between the start of successive CRM calls.
    #[serde(with = "crate::app::config::serde_helpers")]
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // The CRM enforces roughly one request per second.
            min_interval: Duration::from_secs(1),
        }
    }
}

/// Enforces a minimum spacing between outbound CRM calls.
///
/// Shared by every dispatch path (batch loop and bulk sub-calls); callers
/// reserve the next slot under a short lock and sleep outside it.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the caller may start the next CRM call.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.min_interval);
            slot
        };

        if slot > Instant::now() {
            tokio::time::sleep_until(slot.into()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_acquires_are_spaced_by_min_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(250));
        let start = tokio::time::Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // Two enforced gaps after the free first slot.
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_limiting() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = tokio::time::Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
