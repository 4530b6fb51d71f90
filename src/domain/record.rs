use serde::{Deserialize, Serialize};

/// Identifier of a platform record (contact/lead) referenced by operations.
pub type RecordId = u64;

/// The subset of a platform contact the dispatcher reads when building CRM
/// payloads for bulk synchronization. Loading and persisting the full record
/// stays with the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: RecordId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
}

impl LeadRecord {
    pub fn new(id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            phone: None,
            source: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
