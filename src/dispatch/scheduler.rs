use super::batch::{Batch, BatchConfig, FlushReason};
use super::rate_limit::RateLimiter;
use super::retry::{RetryDecision, RetryPolicy};
use super::stats::DispatchStats;
use crate::domain::{FailureKind, Operation, OperationResult};
use crate::queue::{OperationQueue, QueueReceiver};
use crate::sender::{CrmSender, TelemetrySink};
use crate::sync::RecordStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The single dispatch loop.
///
/// One scheduler instance drives all outbound CRM calls: the rate limit is a
/// global resource, so multiplexing across workers would need a shared token
/// anyway. Producers only ever touch the queue.
pub(crate) struct Scheduler<S: RecordStore> {
    receiver: QueueReceiver,
    queue: OperationQueue,
    sender: CrmSender<S>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    stats: Arc<DispatchStats>,
    telemetry: Arc<dyn TelemetrySink>,
    batch: BatchConfig,
    drain_timeout: Duration,
    in_flight: AtomicBool,
    shutdown: CancellationToken,
}

impl<S: RecordStore> Scheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        receiver: QueueReceiver,
        queue: OperationQueue,
        sender: CrmSender<S>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        stats: Arc<DispatchStats>,
        telemetry: Arc<dyn TelemetrySink>,
        batch: BatchConfig,
        drain_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            queue,
            sender,
            limiter,
            retry,
            stats,
            telemetry,
            batch,
            drain_timeout,
            in_flight: AtomicBool::new(false),
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            batch_size = self.batch.max_size,
            flush_interval_ms = self.batch.flush_interval.as_millis() as u64,
            rate_limit_ms = self.limiter.min_interval().as_millis() as u64,
            "dispatch loop started"
        );

        let mut pending: Vec<Operation> = Vec::with_capacity(self.batch.max_size);
        let mut flush_timer = tokio::time::interval(self.batch.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        flush_timer.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.drain(&mut pending).await;
                    break;
                }
                maybe_op = self.receiver.recv() => {
                    let Some(op) = maybe_op else {
                        self.drain(&mut pending).await;
                        break;
                    };
                    self.accept(op, &mut pending);
                    if pending.len() >= self.batch.max_size {
                        self.flush(&mut pending, FlushReason::SizeLimit).await;
                        flush_timer.reset();
                    }
                }
                _ = flush_timer.tick() => {
                    if !pending.is_empty() {
                        self.flush(&mut pending, FlushReason::Interval).await;
                    }
                }
            }
        }

        info!("dispatch loop stopped");
    }

    /// Adds a ready operation to the in-progress batch; operations scheduled
    /// for the future are parked on a timer instead of blocking the batch.
    fn accept(&self, op: Operation, pending: &mut Vec<Operation>) {
        let now = Instant::now();
        if op.is_due(now) {
            pending.push(op);
        } else {
            let delay = op.scheduled_at - now;
            self.defer(op, delay);
        }
    }

    fn defer(&self, op: Operation, delay: Duration) {
        debug!(id = %op.id, delay_ms = delay.as_millis() as u64, "deferring operation until scheduled time");
        let queue = self.queue.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let id = op.id.clone();
            if let Err(error) = queue.submit(op) {
                warn!(id = %id, "failed to re-queue deferred operation: {error}");
                stats.record_attempt(false);
            }
        });
    }

    async fn flush(&self, pending: &mut Vec<Operation>, reason: FlushReason) {
        if pending.is_empty() {
            return;
        }

        // At most one batch is in flight at any time. If a flush overlaps an
        // ongoing one, its operations go back to the queue instead.
        if self.in_flight.swap(true, Ordering::Acquire) {
            warn!(count = pending.len(), "batch already in flight; re-queueing operations");
            for op in pending.drain(..) {
                let id = op.id.clone();
                if let Err(error) = self.queue.submit(op) {
                    warn!(id = %id, "failed to re-queue operation: {error}");
                    self.stats.record_attempt(false);
                }
            }
            return;
        }

        let operations: Vec<Operation> = pending.drain(..).collect();
        let batch = Batch::new(operations, reason);
        let batch_id = batch.id().to_string();
        let size = batch.len();
        let started = Instant::now();

        debug!(batch = %batch_id, size, reason = ?reason, "processing batch");

        let mut results = Vec::with_capacity(size);
        for op in batch.into_operations() {
            self.limiter.acquire().await;

            let result = self.sender.execute(&op).await;
            self.stats.record_attempt(result.success);
            if !result.success {
                self.handle_failure(op, &result);
            }
            results.push(result);
        }

        let elapsed = started.elapsed();
        self.stats.record_batch(size, elapsed);
        self.telemetry.record_batch(&batch_id, &results);

        info!(
            batch = %batch_id,
            size,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch processed"
        );

        self.in_flight.store(false, Ordering::Release);
    }

    /// Retry controller: re-queue with linear backoff while budget remains,
    /// otherwise finalize as failed exactly once.
    fn handle_failure(&self, op: Operation, result: &OperationResult) {
        let failure = result.failure.unwrap_or(FailureKind::Transient);

        match self.retry.evaluate(&op, failure) {
            RetryDecision::Retry { delay } => {
                let retry = op.into_retry(delay);
                debug!(
                    id = %retry.id,
                    attempt = retry.retry_count,
                    max_retries = retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying failed operation"
                );
                let id = retry.id.clone();
                match self.queue.submit(retry) {
                    Ok(()) => self.stats.record_retry(),
                    Err(error) => {
                        warn!(id = %id, "failed to queue retry; operation dropped: {error}");
                    }
                }
            }
            RetryDecision::GiveUp => {
                error!(
                    id = %op.id,
                    kind = %op.kind,
                    attempts = op.retry_count + 1,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "operation failed permanently"
                );
            }
        }
    }

    /// Graceful-shutdown drain: process what is already queued, bounded by the
    /// drain timeout. Whatever remains afterwards is abandoned and logged;
    /// shutdown must never block indefinitely.
    async fn drain(&mut self, pending: &mut Vec<Operation>) {
        let mut abandoned_future = 0usize;

        let drained = tokio::time::timeout(self.drain_timeout, async {
            loop {
                let now = Instant::now();
                while pending.len() < self.batch.max_size {
                    let Some(op) = self.receiver.try_recv() else {
                        break;
                    };
                    if op.is_due(now) {
                        pending.push(op);
                    } else {
                        // Not due yet and nobody left to wait for it.
                        abandoned_future += 1;
                    }
                }

                if pending.is_empty() {
                    break;
                }
                self.flush(pending, FlushReason::Shutdown).await;
            }
        })
        .await;

        if abandoned_future > 0 {
            warn!(count = abandoned_future, "abandoning operations scheduled past shutdown");
        }

        match drained {
            Ok(()) => info!("queue drained before shutdown"),
            Err(_) => {
                warn!(
                    remaining = self.receiver.len() + pending.len(),
                    "drain timeout exceeded; abandoning queued operations"
                );
            }
        }
    }
}
