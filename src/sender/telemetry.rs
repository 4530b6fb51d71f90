use crate::domain::OperationResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Optional sink for per-batch dispatch results, kept for operational
/// debugging. Absence (or a no-op sink) never affects correctness.
pub trait TelemetrySink: Send + Sync {
    fn record_batch(&self, batch_id: &str, results: &[OperationResult]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record_batch(&self, _batch_id: &str, _results: &[OperationResult]) {}
}

/// One recorded batch outcome.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub recorded_at: DateTime<Utc>,
    pub results: Vec<OperationResult>,
}

struct StoredRecord {
    stored_at: Instant,
    record: BatchRecord,
}

/// In-memory ring of recent batch results with a short TTL, bounded in both
/// age and count.
pub struct MemoryTelemetry {
    ttl: Duration,
    max_batches: usize,
    inner: Mutex<VecDeque<StoredRecord>>,
}

impl MemoryTelemetry {
    pub fn new(ttl: Duration, max_batches: usize) -> Self {
        Self {
            ttl,
            max_batches,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Recent batch records, oldest first, with expired entries evicted.
    pub fn recent(&self) -> Vec<BatchRecord> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::evict(&mut inner, now, self.ttl, self.max_batches);
        inner.iter().map(|stored| stored.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(inner: &mut VecDeque<StoredRecord>, now: Instant, ttl: Duration, max: usize) {
        while let Some(front) = inner.front() {
            if now.duration_since(front.stored_at) > ttl {
                inner.pop_front();
            } else {
                break;
            }
        }
        while inner.len() > max {
            inner.pop_front();
        }
    }
}

impl Default for MemoryTelemetry {
    fn default() -> Self {
        // Mirrors the one-hour result cache the platform keeps for debugging.
        Self::new(Duration::from_secs(3600), 256)
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record_batch(&self, batch_id: &str, results: &[OperationResult]) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.push_back(StoredRecord {
            stored_at: now,
            record: BatchRecord {
                batch_id: batch_id.to_string(),
                recorded_at: Utc::now(),
                results: results.to_vec(),
            },
        });
        Self::evict(&mut inner, now, self.ttl, self.max_batches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, OperationKind, OperationResult, Payload};

    fn result() -> OperationResult {
        let op = Operation::new(OperationKind::CreateRecord, Payload::new(), 1, 3, Some(1));
        OperationResult::success(&op, Some("ext".to_string()), Some(200))
    }

    #[test]
    fn records_are_kept_in_order() {
        let telemetry = MemoryTelemetry::new(Duration::from_secs(60), 8);
        telemetry.record_batch("batch-1", &[result()]);
        telemetry.record_batch("batch-2", &[result(), result()]);

        let recent = telemetry.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].batch_id, "batch-1");
        assert_eq!(recent[1].results.len(), 2);
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let telemetry = MemoryTelemetry::new(Duration::from_secs(60), 2);
        telemetry.record_batch("batch-1", &[result()]);
        telemetry.record_batch("batch-2", &[result()]);
        telemetry.record_batch("batch-3", &[result()]);

        let recent = telemetry.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].batch_id, "batch-2");
    }

    #[test]
    fn expired_records_are_evicted() {
        let telemetry = MemoryTelemetry::new(Duration::ZERO, 8);
        telemetry.record_batch("batch-1", &[result()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(telemetry.recent().is_empty());
    }

    #[test]
    fn null_sink_accepts_anything() {
        NullTelemetry.record_batch("batch-1", &[result()]);
    }
}
