use super::record::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque key-value payload forwarded to the CRM API. Structure depends on
/// the operation kind.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Payload key carrying the CRM person id for updates and notes.
pub const PAYLOAD_PERSON_ID: &str = "person_id";
/// Payload key carrying the note body for `CreateNote`.
pub const PAYLOAD_NOTE_CONTENT: &str = "content";
/// Payload key carrying the target record ids of a `BulkSync` chunk.
pub const PAYLOAD_RECORD_IDS: &str = "record_ids";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateRecord,
    UpdateRecord,
    CreateNote,
    BulkSync,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::CreateRecord => "create_record",
            OperationKind::UpdateRecord => "update_record",
            OperationKind::CreateNote => "create_note",
            OperationKind::BulkSync => "bulk_sync",
        }
    }

    /// Default priority per kind; lower value means higher urgency.
    /// New-lead creation outranks routine updates, notes and bulk housekeeping.
    pub fn default_priority(self) -> u8 {
        match self {
            OperationKind::CreateRecord => 1,
            OperationKind::UpdateRecord => 2,
            OperationKind::CreateNote => 3,
            OperationKind::BulkSync => 4,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued unit of work destined for the CRM API.
///
/// Immutable after creation except for the retry bookkeeping, which is only
/// advanced through [`Operation::into_retry`].
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub payload: Payload,
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub target_ref: Option<RecordId>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Instant,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        payload: Payload,
        priority: u8,
        max_retries: u32,
        target_ref: Option<RecordId>,
    ) -> Self {
        let created_at = Utc::now();
        let id = match target_ref {
            Some(record) => format!("{}_{}_{}", kind.as_str(), record, created_at.timestamp()),
            None => {
                let tag = Uuid::new_v4().simple().to_string();
                format!("{}_{}_{}", kind.as_str(), &tag[..8], created_at.timestamp())
            }
        };

        Self {
            id,
            kind,
            payload,
            priority,
            retry_count: 0,
            max_retries,
            target_ref,
            created_at,
            scheduled_at: Instant::now(),
        }
    }

    /// Pushes the earliest dispatch time `delay` into the future.
    pub fn scheduled_after(mut self, delay: Duration) -> Self {
        self.scheduled_at = Instant::now() + delay;
        self
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.scheduled_at <= now
    }

    /// Consumes a failed operation and produces its next attempt, delayed by
    /// `delay`. Callers must have checked the retry budget first; the
    /// `retry_count <= max_retries` invariant is preserved here.
    pub fn into_retry(mut self, delay: Duration) -> Self {
        debug_assert!(self.retry_count < self.max_retries);
        self.retry_count += 1;
        self.scheduled_at = Instant::now() + delay;
        self
    }
}

/// Failure classification used by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network/server error, eligible for retry.
    Transient,
    /// The CRM throttled the request; retryable and tracked separately.
    RateLimited,
    /// Logic error (e.g. malformed bulk payload); never retried.
    Terminal,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Terminal)
    }
}

/// Outcome of dispatching one operation, consumed internally by the retry
/// controller, statistics and telemetry. Producers never see this value.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub operation_id: String,
    pub kind: OperationKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl OperationResult {
    pub fn success(op: &Operation, external_id: Option<String>, http_status: Option<u16>) -> Self {
        Self {
            operation_id: op.id.clone(),
            kind: op.kind,
            success: true,
            external_id,
            error: None,
            failure: None,
            http_status,
        }
    }

    pub fn failure(
        op: &Operation,
        failure: FailureKind,
        error: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            operation_id: op.id.clone(),
            kind: op.kind,
            success: false,
            external_id: None,
            error: Some(error.into()),
            failure: Some(failure),
            http_status,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.failure == Some(FailureKind::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_embeds_kind_and_target() {
        let op = Operation::new(
            OperationKind::CreateRecord,
            Payload::new(),
            1,
            3,
            Some(42),
        );
        assert!(op.id.starts_with("create_record_42_"));
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.max_retries, 3);
    }

    #[test]
    fn operation_without_target_gets_unique_id() {
        let a = Operation::new(OperationKind::CreateNote, Payload::new(), 3, 3, None);
        let b = Operation::new(OperationKind::CreateNote, Payload::new(), 3, 3, None);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("create_note_"));
    }

    #[test]
    fn default_priorities_rank_interactive_before_bulk() {
        assert!(
            OperationKind::CreateRecord.default_priority()
                < OperationKind::UpdateRecord.default_priority()
        );
        assert!(
            OperationKind::UpdateRecord.default_priority()
                < OperationKind::CreateNote.default_priority()
        );
        assert!(
            OperationKind::CreateNote.default_priority()
                < OperationKind::BulkSync.default_priority()
        );
    }

    #[test]
    fn into_retry_advances_count_and_schedule() {
        let op = Operation::new(OperationKind::UpdateRecord, Payload::new(), 2, 3, None);
        let before = Instant::now();
        let retried = op.into_retry(Duration::from_secs(30));
        assert_eq!(retried.retry_count, 1);
        assert!(retried.scheduled_at >= before + Duration::from_secs(30));
        assert!(!retried.is_due(Instant::now()));
    }

    #[test]
    fn scheduled_after_defers_dispatch() {
        let op = Operation::new(OperationKind::BulkSync, Payload::new(), 4, 2, None)
            .scheduled_after(Duration::from_secs(5));
        assert!(!op.is_due(Instant::now()));
    }

    #[test]
    fn terminal_failures_are_not_retryable() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(!FailureKind::Terminal.is_retryable());
    }

    #[test]
    fn result_serializes_without_empty_fields() {
        let op = Operation::new(OperationKind::CreateRecord, Payload::new(), 1, 3, Some(7));
        let result = OperationResult::success(&op, Some("ext-1".to_string()), Some(200));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["external_id"], "ext-1");
        assert!(json.get("error").is_none());
        assert!(json.get("failure").is_none());
    }
}
