// Lock-free dispatch statistics using atomic operations.
//
// Counters are updated from the dispatch loop and read on demand by any
// producer thread without locking.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for the dispatcher. Created at start, never persisted;
/// a restart resets them.
#[derive(Debug, Default)]
pub struct DispatchStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    rate_limited: AtomicU64,
    batches: AtomicU64,
    batch_millis: AtomicU64,
    batch_operations: AtomicU64,
    last_batch_unix: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one dispatch attempt. A retried operation contributes one
    /// attempt per try.
    pub fn record_attempt(&self, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records that a failed operation was re-queued for another attempt.
    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rate-limited response, wherever it was observed.
    pub fn record_rate_limit_hit(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, operations: usize, elapsed: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batch_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.batch_operations
            .fetch_add(operations as u64, Ordering::Relaxed);
        self.last_batch_unix
            .store(Utc::now().timestamp() as u64, Ordering::Relaxed);
    }

    /// Lock-free snapshot of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let batch_millis = self.batch_millis.load(Ordering::Relaxed);
        let batch_operations = self.batch_operations.load(Ordering::Relaxed);
        let average_operation_millis = if batch_operations > 0 {
            batch_millis / batch_operations
        } else {
            0
        };

        let last_batch_unix = self.last_batch_unix.load(Ordering::Relaxed);
        let last_batch_at = if last_batch_unix > 0 {
            DateTime::from_timestamp(last_batch_unix as i64, 0)
        } else {
            None
        };

        StatsSnapshot {
            total_operations: self.total.load(Ordering::Relaxed),
            successful_operations: self.successful.load(Ordering::Relaxed),
            failed_operations: self.failed.load(Ordering::Relaxed),
            retried_operations: self.retried.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limited.load(Ordering::Relaxed),
            batches_processed: self.batches.load(Ordering::Relaxed),
            average_operation_millis,
            last_batch_at,
        }
    }
}

/// Immutable snapshot of dispatch statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub retried_operations: u64,
    pub rate_limit_hits: u64,
    pub batches_processed: u64,
    /// Batch processing time amortized over the operations it contained.
    pub average_operation_millis: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 1.0;
        }
        self.successful_operations as f64 / self.total_operations as f64
    }
}
