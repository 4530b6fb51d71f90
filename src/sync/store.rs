use crate::domain::{LeadRecord, RecordId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;

/// Persistence boundary for synchronization state on platform records.
///
/// The host application owns the real storage; the dispatcher only writes
/// CRM identifiers back and queries which records still need synchronizing.
/// Errors cross the boundary type-erased.
pub trait RecordStore: Send + Sync + 'static {
    /// Persist the CRM-assigned identifier and mark the record synced.
    fn mark_synced(
        &self,
        id: RecordId,
        external_id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Load the not-yet-synchronized subset of `ids`, ready for payload
    /// construction.
    fn load_unsynced(
        &self,
        ids: &[RecordId],
    ) -> impl Future<Output = anyhow::Result<Vec<LeadRecord>>> + Send;

    /// Ids of records never synchronized, bounded by `limit`. Used by the
    /// periodic catch-up pass.
    fn unsynced_ids(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<RecordId>>> + Send;
}

struct StoredRecord {
    record: LeadRecord,
    external_id: Option<String>,
}

/// In-memory record store for tests and embedding hosts without their own
/// persistence wiring.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<BTreeMap<RecordId, StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: LeadRecord) {
        self.inner.lock().insert(
            record.id,
            StoredRecord {
                record,
                external_id: None,
            },
        );
    }

    pub fn external_id(&self, id: RecordId) -> Option<String> {
        self.inner
            .lock()
            .get(&id)
            .and_then(|stored| stored.external_id.clone())
    }

    pub fn is_synced(&self, id: RecordId) -> bool {
        self.external_id(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unsynced_count(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|stored| stored.external_id.is_none())
            .count()
    }
}

impl RecordStore for MemoryRecordStore {
    fn mark_synced(
        &self,
        id: RecordId,
        external_id: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let external_id = external_id.to_string();
        async move {
            let mut inner = self.inner.lock();
            let stored = inner
                .get_mut(&id)
                .ok_or_else(|| anyhow::anyhow!("record {id} not found"))?;
            stored.external_id = Some(external_id);
            Ok(())
        }
    }

    fn load_unsynced(
        &self,
        ids: &[RecordId],
    ) -> impl Future<Output = anyhow::Result<Vec<LeadRecord>>> + Send {
        let ids = ids.to_vec();
        async move {
            let inner = self.inner.lock();
            Ok(ids
                .iter()
                .filter_map(|id| inner.get(id))
                .filter(|stored| stored.external_id.is_none())
                .map(|stored| stored.record.clone())
                .collect())
        }
    }

    fn unsynced_ids(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<RecordId>>> + Send {
        async move {
            let inner = self.inner.lock();
            Ok(inner
                .values()
                .filter(|stored| stored.external_id.is_none())
                .take(limit)
                .map(|stored| stored.record.id)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_records(count: RecordId) -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        for id in 1..=count {
            store.insert(LeadRecord::new(id, format!("Lead {id}")));
        }
        store
    }

    #[test]
    fn mark_synced_records_external_id() {
        let store = store_with_records(3);

        tokio_test::block_on(store.mark_synced(2, "crm-2")).unwrap();

        assert!(store.is_synced(2));
        assert_eq!(store.external_id(2), Some("crm-2".to_string()));
        assert!(!store.is_synced(1));
        assert_eq!(store.unsynced_count(), 2);
    }

    #[test]
    fn mark_synced_unknown_record_errors() {
        let store = store_with_records(1);
        let result = tokio_test::block_on(store.mark_synced(99, "crm-99"));
        assert!(result.is_err());
    }

    #[test]
    fn load_unsynced_filters_synced_records() {
        let store = store_with_records(4);
        tokio_test::block_on(store.mark_synced(1, "crm-1")).unwrap();

        let records = tokio_test::block_on(store.load_unsynced(&[1, 2, 3, 99])).unwrap();
        let ids: Vec<RecordId> = records.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn unsynced_ids_honors_limit() {
        let store = store_with_records(10);
        let ids = tokio_test::block_on(store.unsynced_ids(4)).unwrap();
        assert_eq!(ids.len(), 4);
    }
}
