use crm_dispatch::domain::{Operation, OperationKind, Payload};
use crm_dispatch::queue::{self, QueueError};

fn op(priority: u8) -> Operation {
    Operation::new(OperationKind::UpdateRecord, Payload::new(), priority, 3, None)
}

// A full queue rejects immediately; nothing blocks, nothing silently succeeds.
#[tokio::test]
async fn submit_at_capacity_returns_queue_full() {
    let capacity = 4;
    let (queue, _rx) = queue::bounded(capacity).unwrap();

    for i in 0..capacity {
        queue.submit(op(i as u8)).unwrap();
    }

    for _ in 0..3 {
        assert!(matches!(queue.submit(op(9)), Err(QueueError::Full)));
    }

    let metrics = queue.metrics();
    assert_eq!(metrics.depth, capacity);
    assert_eq!(metrics.submitted, capacity as u64);
    assert_eq!(metrics.rejected, 3);
}

#[tokio::test]
async fn rejected_submissions_do_not_consume_capacity() {
    let (queue, mut rx) = queue::bounded(2).unwrap();
    queue.submit(op(1)).unwrap();
    queue.submit(op(2)).unwrap();
    assert!(queue.submit(op(3)).is_err());

    // Draining one slot makes exactly one new submission possible.
    rx.recv().await.unwrap();
    queue.submit(op(3)).unwrap();
    assert!(matches!(queue.submit(op(4)), Err(QueueError::Full)));
}

#[tokio::test]
async fn concurrent_producers_observe_consistent_accounting() {
    let (queue, _rx) = queue::bounded(64).unwrap();
    let queue = std::sync::Arc::new(queue);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let mut accepted = 0u64;
            for i in 0..20 {
                if queue.submit(op(i as u8)).is_ok() {
                    accepted += 1;
                }
            }
            accepted
        }));
    }

    let mut accepted = 0u64;
    for task in tasks {
        accepted += task.await.unwrap();
    }

    let metrics = queue.metrics();
    assert_eq!(accepted, 64);
    assert_eq!(metrics.submitted, 64);
    assert_eq!(metrics.rejected, 160 - 64);
    assert_eq!(metrics.depth, 64);
}
