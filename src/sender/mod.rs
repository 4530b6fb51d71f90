pub mod client;
pub mod telemetry;

pub use client::{ClientConfig, ClientError, CrmClient, CrmResponse};
pub use telemetry::{BatchRecord, MemoryTelemetry, NullTelemetry, TelemetrySink};

use crate::dispatch::rate_limit::RateLimiter;
use crate::dispatch::stats::DispatchStats;
use crate::domain::{
    FailureKind, LeadRecord, Operation, OperationKind, OperationResult, PAYLOAD_NOTE_CONTENT,
    PAYLOAD_PERSON_ID, PAYLOAD_RECORD_IDS, Payload, RecordId,
};
use crate::sync::RecordStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes single operations against the CRM and classifies their outcomes.
///
/// Combines the HTTP client with the record store (sync-state write-back) and
/// the shared rate limiter (spacing of bulk sub-calls).
pub struct CrmSender<S> {
    client: CrmClient,
    store: Arc<S>,
    limiter: Arc<RateLimiter>,
    stats: Arc<DispatchStats>,
}

impl<S: RecordStore> CrmSender<S> {
    pub fn new(
        client: CrmClient,
        store: Arc<S>,
        limiter: Arc<RateLimiter>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            client,
            store,
            limiter,
            stats,
        }
    }

    pub async fn execute(&self, op: &Operation) -> OperationResult {
        match op.kind {
            OperationKind::CreateRecord => self.create_record(op).await,
            OperationKind::UpdateRecord => self.update_record(op).await,
            OperationKind::CreateNote => self.create_note(op).await,
            OperationKind::BulkSync => self.bulk_sync(op).await,
        }
    }

    async fn create_record(&self, op: &Operation) -> OperationResult {
        let response = match self.client.create_person(&op.payload).await {
            Ok(response) => response,
            Err(error) => return self.request_failure(op, &error),
        };

        if response.is_success()
            && let Some(target) = op.target_ref
            && let Some(external_id) = response.external_id.as_deref()
        {
            self.write_back(target, external_id).await;
        }

        self.classify(op, response, None)
    }

    async fn update_record(&self, op: &Operation) -> OperationResult {
        let Some(person_id) = op.payload.get(PAYLOAD_PERSON_ID).and_then(Value::as_str) else {
            return OperationResult::failure(
                op,
                FailureKind::Transient,
                "missing CRM person id in payload",
                None,
            );
        };

        // The person id addresses the request; it is not part of the update.
        let mut update = op.payload.clone();
        update.remove(PAYLOAD_PERSON_ID);

        match self.client.update_person(person_id, &update).await {
            Ok(response) => self.classify(op, response, Some(person_id)),
            Err(error) => self.request_failure(op, &error),
        }
    }

    async fn create_note(&self, op: &Operation) -> OperationResult {
        let Some(person_id) = op.payload.get(PAYLOAD_PERSON_ID).and_then(Value::as_str) else {
            return OperationResult::failure(
                op,
                FailureKind::Transient,
                "missing CRM person id in payload",
                None,
            );
        };
        let Some(content) = op.payload.get(PAYLOAD_NOTE_CONTENT).and_then(Value::as_str) else {
            return OperationResult::failure(
                op,
                FailureKind::Transient,
                "missing note content in payload",
                None,
            );
        };

        match self.client.create_note(person_id, content).await {
            Ok(response) => self.classify(op, response, Some(person_id)),
            Err(error) => self.request_failure(op, &error),
        }
    }

    /// One chunk of a bulk synchronization: load the still-unsynced subset of
    /// the chunk's targets and create each through the shared rate limiter.
    /// A partially failed chunk fails (and retries) as a unit; records synced
    /// on an earlier attempt are filtered out by the store on the next pass.
    async fn bulk_sync(&self, op: &Operation) -> OperationResult {
        let ids: Vec<RecordId> = match op
            .payload
            .get(PAYLOAD_RECORD_IDS)
            .map(|value| serde_json::from_value(value.clone()))
        {
            Some(Ok(ids)) => ids,
            // A chunk without a readable target list is a logic error, not a
            // transient condition; retrying cannot fix it.
            _ => {
                return OperationResult::failure(
                    op,
                    FailureKind::Terminal,
                    "invalid record ids in bulk sync payload",
                    None,
                );
            }
        };

        let records = match self.store.load_unsynced(&ids).await {
            Ok(records) => records,
            Err(error) => {
                return OperationResult::failure(
                    op,
                    FailureKind::Transient,
                    format!("record store error: {error}"),
                    None,
                );
            }
        };

        let mut synced = 0usize;
        let mut failed = 0usize;

        for record in &records {
            self.limiter.acquire().await;

            match self.client.create_person(&lead_payload(record)).await {
                Ok(response) => {
                    if response.is_rate_limited() {
                        self.stats.record_rate_limit_hit();
                    }
                    if response.is_success() {
                        if let Some(external_id) = response.external_id.as_deref() {
                            self.write_back(record.id, external_id).await;
                        }
                        synced += 1;
                    } else {
                        failed += 1;
                        warn!(
                            record = record.id,
                            status = response.status,
                            "bulk sync create rejected by CRM"
                        );
                    }
                }
                Err(error) => {
                    failed += 1;
                    warn!(record = record.id, "bulk sync create failed: {error}");
                }
            }
        }

        debug!(
            id = %op.id,
            loaded = records.len(),
            synced,
            failed,
            "bulk sync chunk processed"
        );

        if failed == 0 {
            OperationResult::success(op, None, None)
        } else {
            OperationResult::failure(
                op,
                FailureKind::Transient,
                format!("synced {synced} of {} records ({failed} failed)", records.len()),
                None,
            )
        }
    }

    fn classify(
        &self,
        op: &Operation,
        response: CrmResponse,
        fallback_id: Option<&str>,
    ) -> OperationResult {
        if response.is_rate_limited() {
            self.stats.record_rate_limit_hit();
            return OperationResult::failure(
                op,
                FailureKind::RateLimited,
                "rate limited by CRM API",
                Some(response.status),
            );
        }

        if response.is_success() {
            let external_id = response
                .external_id
                .or_else(|| fallback_id.map(str::to_string));
            OperationResult::success(op, external_id, Some(response.status))
        } else {
            OperationResult::failure(
                op,
                FailureKind::Transient,
                format!("CRM API error: {}", response.status),
                Some(response.status),
            )
        }
    }

    fn request_failure(&self, op: &Operation, error: &ClientError) -> OperationResult {
        warn!(id = %op.id, "CRM request failed: {error}");
        OperationResult::failure(op, FailureKind::Transient, error.to_string(), None)
    }

    /// Writes the CRM-assigned id back onto the originating record. A store
    /// failure is logged but does not fail the operation; the CRM accepted it.
    async fn write_back(&self, target: RecordId, external_id: &str) {
        match self.store.mark_synced(target, external_id).await {
            Ok(()) => debug!(record = target, external_id, "record marked synced"),
            Err(error) => {
                warn!(record = target, "failed to persist sync state: {error}");
            }
        }
    }
}

/// CRM person payload for one platform record, used by the bulk path.
pub fn lead_payload(record: &LeadRecord) -> Payload {
    let mut payload = Payload::new();
    payload.insert("firstName".to_string(), json!(record.name));

    if let Some(phone) = &record.phone {
        payload.insert(
            "phones".to_string(),
            json!([{ "number": phone, "type": "Mobile", "primary": true }]),
        );
    }
    if let Some(email) = &record.email {
        payload.insert(
            "emails".to_string(),
            json!([{ "address": email, "type": "Personal", "primary": true }]),
        );
    }
    if let Some(source) = &record.source {
        payload.insert("source".to_string(), json!(source));
    }
    payload.insert("tags".to_string(), json!(["bulk-sync", "website-lead"]));

    payload
}
