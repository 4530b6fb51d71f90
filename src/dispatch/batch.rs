use crate::domain::Operation;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// What triggered a batch flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    SizeLimit,
    Interval,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush as soon as this many operations have accumulated.
    pub max_size: usize,
    /// Flush whatever has accumulated once this much time has passed.
    #[serde(with = "crate::app::config::serde_helpers")]
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// An ephemeral, priority-ordered group of operations processed in one
/// dispatch pass. Exists only for the duration of processing.
#[derive(Debug)]
pub struct Batch {
    id: String,
    operations: Vec<Operation>,
    reason: FlushReason,
    created_at: Instant,
}

impl Batch {
    pub fn new(mut operations: Vec<Operation>, reason: FlushReason) -> Self {
        // Stable sort: within equal priorities, arrival order is preserved.
        operations.sort_by_key(|op| op.priority);

        Self {
            id: Uuid::new_v4().to_string(),
            operations,
            reason,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn reason(&self) -> FlushReason {
        self.reason
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationKind, Payload};

    fn op(kind: OperationKind, priority: u8) -> Operation {
        Operation::new(kind, Payload::new(), priority, 3, None)
    }

    #[test]
    fn batch_orders_by_priority_ascending() {
        let batch = Batch::new(
            vec![
                op(OperationKind::BulkSync, 4),
                op(OperationKind::CreateRecord, 1),
                op(OperationKind::CreateNote, 3),
                op(OperationKind::UpdateRecord, 2),
            ],
            FlushReason::SizeLimit,
        );

        let priorities: Vec<u8> = batch.operations().iter().map(|op| op.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4]);
    }

    #[test]
    fn equal_priorities_keep_arrival_order() {
        let first = op(OperationKind::UpdateRecord, 2);
        let second = op(OperationKind::UpdateRecord, 2);
        let first_id = first.id.clone();
        let second_id = second.id.clone();

        let batch = Batch::new(
            vec![op(OperationKind::CreateNote, 3), first, second],
            FlushReason::Interval,
        );

        assert_eq!(batch.operations()[0].id, first_id);
        assert_eq!(batch.operations()[1].id, second_id);
    }

    #[test]
    fn batches_get_unique_ids() {
        let a = Batch::new(Vec::new(), FlushReason::Interval);
        let b = Batch::new(Vec::new(), FlushReason::Interval);
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }
}
