use super::store::RecordStore;
use crate::dispatch::bulk::{BulkConfig, enqueue_bulk};
use crate::queue::OperationQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchUpConfig {
    pub enabled: bool,
    /// How often to scan for records that were never synchronized.
    #[serde(with = "crate::app::config::serde_helpers")]
    pub interval: Duration,
    /// Upper bound per scan, to avoid flooding the queue in one pass.
    pub scan_limit: usize,
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30 * 60),
            scan_limit: 100,
        }
    }
}

/// Periodic catch-up pass: records that never made it into the CRM (missed
/// submissions, crashes, queue rejections) are picked up here and fed through
/// the bulk splitter.
pub(crate) fn spawn<S: RecordStore>(
    store: Arc<S>,
    queue: OperationQueue,
    bulk: BulkConfig,
    config: CatchUpConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick; the first real scan runs a full interval
        // after start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    run_scan(store.as_ref(), &queue, &bulk, config.scan_limit).await;
                }
            }
        }

        debug!("catch-up task stopped");
    })
}

async fn run_scan<S: RecordStore>(
    store: &S,
    queue: &OperationQueue,
    bulk: &BulkConfig,
    scan_limit: usize,
) {
    match store.unsynced_ids(scan_limit).await {
        Ok(ids) if ids.is_empty() => {
            debug!("catch-up scan found no unsynced records");
        }
        Ok(ids) => {
            info!(count = ids.len(), "starting catch-up bulk sync");
            match enqueue_bulk(queue, &ids, bulk) {
                Ok(chunks) => debug!(chunks, "catch-up chunks queued"),
                Err(error) => warn!("catch-up enqueue failed: {error}"),
            }
        }
        Err(error) => warn!("failed to scan for unsynced records: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeadRecord;
    use crate::queue;
    use crate::sync::MemoryRecordStore;

    #[tokio::test]
    async fn scan_enqueues_chunked_bulk_operations() {
        let store = MemoryRecordStore::new();
        for id in 1..=120 {
            store.insert(LeadRecord::new(id, format!("Lead {id}")));
        }
        let (queue, _rx) = queue::bounded(64).unwrap();

        run_scan(&store, &queue, &BulkConfig::default(), 100).await;

        // 100 scanned ids at a chunk size of 50.
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn scan_with_nothing_unsynced_is_a_no_op() {
        let store = MemoryRecordStore::new();
        let (queue, _rx) = queue::bounded(8).unwrap();

        run_scan(&store, &queue, &BulkConfig::default(), 100).await;

        assert!(queue.is_empty());
    }
}
