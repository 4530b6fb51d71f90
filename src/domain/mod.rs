//! Domain layer for crm-dispatch.
//!
//! Contains the canonical types shared across all modules:
//! - `Operation`: One pending unit of work against the CRM API
//! - `OperationResult`: Outcome of dispatching one operation
//! - `LeadRecord`: The slice of a platform record the dispatcher reads

pub mod operation;
pub mod record;

pub use operation::{
    FailureKind, Operation, OperationKind, OperationResult, PAYLOAD_NOTE_CONTENT,
    PAYLOAD_PERSON_ID, PAYLOAD_RECORD_IDS, Payload,
};
pub use record::{LeadRecord, RecordId};
