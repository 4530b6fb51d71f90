pub mod batch;
pub mod bulk;
pub mod rate_limit;
pub mod retry;
mod scheduler;
pub mod stats;

pub use batch::{Batch, BatchConfig, FlushReason};
pub use bulk::{BulkConfig, split_targets};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::{DispatchStats, StatsSnapshot};

use crate::app::config::{ConfigError, DispatchConfig};
use crate::domain::{Operation, OperationKind, Payload, RecordId};
use crate::queue::{self, OperationQueue, QueueError, QueueMetrics};
use crate::sender::{ClientError, CrmClient, CrmSender, NullTelemetry, TelemetrySink};
use crate::sync::{RecordStore, catchup};
use scheduler::Scheduler;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Dispatch worker failed: {0}")]
    Worker(String),
}

/// Builder for the dispatcher: one instance is constructed at process start
/// and handed to producers as a [`DispatcherHandle`]. No ambient globals.
pub struct Dispatcher<S: RecordStore> {
    config: DispatchConfig,
    store: Arc<S>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<S: RecordStore> Dispatcher<S> {
    pub fn new(config: DispatchConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            telemetry: Arc::new(NullTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Validates the configuration, launches the dispatch loop and (when
    /// enabled) the periodic catch-up pass.
    pub fn start(self) -> Result<DispatcherHandle, DispatchError> {
        self.config.validate()?;
        let client = CrmClient::new(self.config.client.clone())?;
        let (queue, receiver) = queue::bounded(self.config.queue_capacity)?;

        let stats = Arc::new(DispatchStats::new());
        let limiter = Arc::new(RateLimiter::new(self.config.rate_limit.min_interval));
        let sender = CrmSender::new(client, self.store.clone(), limiter.clone(), stats.clone());
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(
            Scheduler::new(
                receiver,
                queue.clone(),
                sender,
                limiter,
                RetryPolicy::new(self.config.retry.base_delay),
                stats.clone(),
                self.telemetry.clone(),
                self.config.batch.clone(),
                self.config.shutdown.drain_timeout,
                shutdown.clone(),
            )
            .run(),
        );

        let catch_up = self.config.catch_up.enabled.then(|| {
            catchup::spawn(
                self.store.clone(),
                queue.clone(),
                self.config.bulk.clone(),
                self.config.catch_up.clone(),
                shutdown.clone(),
            )
        });

        info!(
            endpoint = %self.config.client.endpoint,
            queue_capacity = self.config.queue_capacity,
            catch_up = self.config.catch_up.enabled,
            "CRM dispatcher started"
        );

        Ok(DispatcherHandle {
            queue,
            stats,
            max_retries: self.config.retry.max_retries,
            bulk: self.config.bulk.clone(),
            shutdown,
            worker,
            catch_up,
        })
    }
}

/// Producer-facing handle. Submission is fire-and-forget: after acceptance,
/// failures surface only through logs and statistics. The one synchronous
/// failure mode is a full queue.
pub struct DispatcherHandle {
    queue: OperationQueue,
    stats: Arc<DispatchStats>,
    max_retries: u32,
    bulk: BulkConfig,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
    catch_up: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Queues one operation. Non-blocking; returns [`QueueError::Full`]
    /// immediately at capacity.
    pub fn submit(
        &self,
        kind: OperationKind,
        payload: Payload,
        priority: u8,
        target_ref: Option<RecordId>,
    ) -> Result<(), QueueError> {
        let op = Operation::new(kind, payload, priority, self.max_retries, target_ref);
        debug!(id = %op.id, kind = %kind, priority, "queueing CRM operation");
        self.queue.submit(op)
    }

    /// Queues a fully constructed operation (custom schedule or retry budget).
    pub fn submit_operation(&self, op: Operation) -> Result<(), QueueError> {
        self.queue.submit(op)
    }

    /// Splits `targets` into staggered bulk-sync chunks and queues them.
    /// Returns the number of chunks accepted.
    pub fn submit_bulk(&self, targets: &[RecordId]) -> Result<usize, QueueError> {
        bulk::enqueue_bulk(&self.queue, targets, &self.bulk)
    }

    /// Read-only snapshot of the dispatch statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_metrics(&self) -> QueueMetrics {
        self.queue.metrics()
    }

    /// Requests graceful shutdown and waits for the dispatch loop to finish
    /// its bounded drain. Operations still queued after the drain timeout are
    /// abandoned and logged; shutdown never blocks indefinitely.
    pub async fn shutdown(self) -> Result<(), DispatchError> {
        info!("shutting down CRM dispatcher");
        self.shutdown.cancel();

        if let Some(task) = self.catch_up {
            task.await
                .map_err(|error| DispatchError::Worker(error.to_string()))?;
        }
        self.worker
            .await
            .map_err(|error| DispatchError::Worker(error.to_string()))?;

        Ok(())
    }
}
