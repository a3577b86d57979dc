//! In-memory storage implementation.

use std::collections::BTreeMap;

use hsconverge_core::{ResourceAddress, ResourceKind};
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::types::StateRecord;
use crate::{check_kind, StateStore};

/// A `StateStore` held entirely in memory.
///
/// Records are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ResourceAddress, StateRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn put(&self, record: &StateRecord) -> Result<()> {
        check_kind(record)?;
        self.records
            .write()
            .insert(record.address.clone(), record.clone());
        Ok(())
    }

    fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        Ok(self.records.read().get(address).cloned())
    }

    fn delete(&self, address: &ResourceAddress) -> Result<()> {
        self.records
            .write()
            .remove(address)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<StateRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.address.kind == kind)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResourceState, UserState};
    use hsconverge_core::UserId;

    fn user_record(name: &str, id: u64) -> StateRecord {
        StateRecord::new(
            name,
            ResourceState::User(UserState {
                id: UserId::new(id),
                name: name.to_string(),
                email: None,
                display_name: None,
                created_at: None,
            }),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn record_crud() {
        let store = MemoryStore::new();
        let record = user_record("alice", 1);

        store.put(&record).unwrap();
        assert_eq!(store.get(&record.address).unwrap(), Some(record.clone()));
        assert_eq!(store.len(), 1);

        store.delete(&record.address).unwrap();
        assert!(store.get(&record.address).unwrap().is_none());
        assert!(matches!(
            store.delete(&record.address),
            Err(StoreError::NotFound)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn list_filters_by_kind() {
        let store = MemoryStore::new();
        store.put(&user_record("bob", 2)).unwrap();
        store.put(&user_record("alice", 1)).unwrap();

        let users = store.list(ResourceKind::User).unwrap();
        let names: Vec<_> = users.iter().map(|r| r.address.name.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
        assert!(store.list(ResourceKind::ApiKey).unwrap().is_empty());
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn put_rejects_mismatched_kind() {
        let store = MemoryStore::new();
        let mut record = user_record("alice", 1);
        record.address.kind = ResourceKind::NodeTags;

        assert!(matches!(
            store.put(&record),
            Err(StoreError::KindMismatch { .. })
        ));
        assert!(store.is_empty());
    }
}
