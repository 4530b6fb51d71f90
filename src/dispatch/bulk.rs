use crate::domain::{Operation, OperationKind, PAYLOAD_RECORD_IDS, Payload, RecordId};
use crate::queue::{OperationQueue, QueueError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Maximum number of target records per chunk operation.
    pub chunk_size: usize,
    /// Each chunk's earliest dispatch time is offset by `index * stagger`,
    /// spreading bulk load across time instead of bursting the queue.
    #[serde(with = "crate::app::config::serde_helpers")]
    pub stagger: Duration,
    /// Retry budget for chunk operations; lower than the interactive budget
    /// because bulk housekeeping matters less per item.
    pub max_retries: u32,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            stagger: Duration::from_secs(5),
            max_retries: 2,
        }
    }
}

/// Decomposes a large target list into bounded `BulkSync` chunk operations
/// with staggered schedules.
pub fn split_targets(targets: &[RecordId], config: &BulkConfig) -> Vec<Operation> {
    let chunk_size = config.chunk_size.max(1);

    targets
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| {
            let mut payload = Payload::new();
            payload.insert(PAYLOAD_RECORD_IDS.to_string(), json!(chunk));

            Operation::new(
                OperationKind::BulkSync,
                payload,
                OperationKind::BulkSync.default_priority(),
                config.max_retries,
                None,
            )
            .scheduled_after(config.stagger * index as u32)
        })
        .collect()
}

/// Splits `targets` and submits each chunk. Stops at the first rejection,
/// leaving already-accepted chunks queued. Returns the number of chunks
/// submitted.
pub fn enqueue_bulk(
    queue: &OperationQueue,
    targets: &[RecordId],
    config: &BulkConfig,
) -> Result<usize, QueueError> {
    let chunks = split_targets(targets, config);
    let total = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let id = chunk.id.clone();
        if let Err(error) = queue.submit(chunk) {
            debug!(id = %id, submitted = index, total, "bulk chunk rejected by queue");
            return Err(error);
        }
    }

    debug!(targets = targets.len(), chunks = total, "bulk sync queued");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;

    #[test]
    fn splits_120_targets_into_3_chunks_of_at_most_50() {
        let targets: Vec<RecordId> = (1..=120).collect();
        let chunks = split_targets(&targets, &BulkConfig::default());

        assert_eq!(chunks.len(), 3);
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|op| {
                serde_json::from_value::<Vec<RecordId>>(op.payload[PAYLOAD_RECORD_IDS].clone())
                    .unwrap()
                    .len()
            })
            .collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        // Schedules are strictly increasing across chunk indexes.
        for window in chunks.windows(2) {
            assert!(window[0].scheduled_at < window[1].scheduled_at);
        }
    }

    #[test]
    fn chunks_use_bulk_priority_and_retry_budget() {
        let targets: Vec<RecordId> = (1..=10).collect();
        let config = BulkConfig {
            chunk_size: 4,
            stagger: Duration::from_secs(5),
            max_retries: 2,
        };
        let chunks = split_targets(&targets, &config);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.kind, OperationKind::BulkSync);
            assert_eq!(chunk.priority, OperationKind::BulkSync.default_priority());
            assert_eq!(chunk.max_retries, 2);
        }
    }

    #[test]
    fn empty_target_list_produces_no_chunks() {
        assert!(split_targets(&[], &BulkConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn enqueue_stops_at_first_rejection() {
        let (queue, _rx) = queue::bounded(2).unwrap();
        let targets: Vec<RecordId> = (1..=120).collect();

        let result = enqueue_bulk(&queue, &targets, &BulkConfig::default());
        assert!(matches!(result, Err(QueueError::Full)));
        // The first two chunks stay queued.
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn enqueue_reports_chunk_count() {
        let (queue, _rx) = queue::bounded(16).unwrap();
        let targets: Vec<RecordId> = (1..=120).collect();

        let chunks = enqueue_bulk(&queue, &targets, &BulkConfig::default()).unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(queue.len(), 3);
    }
}
