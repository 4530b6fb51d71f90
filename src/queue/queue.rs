use super::metrics::QueueMetrics;
use crate::domain::Operation;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid queue capacity")]
    InvalidCapacity,
    #[error("Operation queue is full")]
    Full,
    #[error("Operation queue is closed")]
    Closed,
}

/// Shared accounting for both halves of the queue.
#[derive(Debug)]
struct QueueState {
    capacity: usize,
    submitted: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
}

impl QueueState {
    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_depth.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_depth.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            capacity: self.capacity,
            depth: self.depth.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
        }
    }
}

/// Producer half of the bounded operation queue.
///
/// `submit` never blocks: at capacity it rejects immediately so producers can
/// surface a "try again" condition instead of stalling request handling.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    tx: mpsc::Sender<Operation>,
    state: Arc<QueueState>,
}

/// Consumer half, owned by the dispatch loop.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Operation>,
    state: Arc<QueueState>,
}

/// Creates a bounded queue pair with fixed capacity.
pub fn bounded(capacity: usize) -> Result<(OperationQueue, QueueReceiver), QueueError> {
    if capacity == 0 {
        return Err(QueueError::InvalidCapacity);
    }
    // Prevent excessive memory allocation
    if capacity > 1_000_000 {
        return Err(QueueError::InvalidCapacity);
    }

    let (tx, rx) = mpsc::channel(capacity);
    let state = Arc::new(QueueState {
        capacity,
        submitted: AtomicU64::new(0),
        rejected: AtomicU64::new(0),
        dispatched: AtomicU64::new(0),
        depth: AtomicUsize::new(0),
        peak_depth: AtomicUsize::new(0),
    });

    Ok((
        OperationQueue {
            tx,
            state: state.clone(),
        },
        QueueReceiver { rx, state },
    ))
}

impl OperationQueue {
    pub fn submit(&self, op: Operation) -> Result<(), QueueError> {
        match self.tx.try_send(op) {
            Ok(()) => {
                self.state.submitted.fetch_add(1, Ordering::Relaxed);
                let depth = self.state.depth.fetch_add(1, Ordering::AcqRel) + 1;
                self.state.update_peak(depth);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.state.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.state.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Closed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    pub fn len(&self) -> usize {
        self.state.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.state.capacity
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.state.metrics()
    }
}

impl QueueReceiver {
    pub async fn recv(&mut self) -> Option<Operation> {
        let op = self.rx.recv().await?;
        self.state.depth.fetch_sub(1, Ordering::Release);
        self.state.dispatched.fetch_add(1, Ordering::Relaxed);
        Some(op)
    }

    pub fn try_recv(&mut self) -> Option<Operation> {
        match self.rx.try_recv() {
            Ok(op) => {
                self.state.depth.fetch_sub(1, Ordering::Release);
                self.state.dispatched.fetch_add(1, Ordering::Relaxed);
                Some(op)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.state.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.state.metrics()
    }
}
