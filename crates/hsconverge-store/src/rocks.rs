//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `StateStore`
//! trait.

use std::path::Path;
use std::sync::Arc;

use hsconverge_core::{ResourceAddress, ResourceKind};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf_for};
use crate::types::StateRecord;
use crate::{check_kind, StateStore};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "Opened state store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get the column family handle for a kind.
    fn cf(&self, kind: ResourceKind) -> Result<Arc<BoundColumnFamily<'_>>> {
        let name = cf_for(kind);
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl StateStore for RocksStore {
    fn put(&self, record: &StateRecord) -> Result<()> {
        check_kind(record)?;
        let cf = self.cf(record.address.kind)?;
        let value = Self::serialize(record)?;

        self.db
            .put_cf(&cf, keys::record_key(&record.address), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        let cf = self.cf(address.kind)?;

        self.db
            .get_cf(&cf, keys::record_key(address))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete(&self, address: &ResourceAddress) -> Result<()> {
        let cf = self.cf(address.kind)?;
        let key = keys::record_key(address);

        let exists = self
            .db
            .get_pinned_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound);
        }

        self.db
            .delete_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<StateRecord>> {
        let cf = self.cf(kind)?;

        let mut records = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let record: StateRecord = Self::deserialize(&value)?;

            if keys::name_from_key(&key).as_deref() != Some(record.address.name.as_str()) {
                tracing::warn!(
                    kind = %kind,
                    name = %record.address.name,
                    "Record filed under a different key"
                );
            }
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiKeyState, NodeAttributeState, PreAuthKeyState, ResourceState};
    use chrono::Utc;
    use hsconverge_core::{ApiKeyPrefix, NodeId, PreAuthKeyId, Secret, UserId};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn pre_auth_key_record(name: &str) -> StateRecord {
        StateRecord::new(
            name,
            ResourceState::PreAuthKey(PreAuthKeyState {
                id: PreAuthKeyId::new(9),
                user_id: UserId::new(5),
                reusable: true,
                ephemeral: false,
                ttl: Some("1h".into()),
                acl_tags: BTreeSet::from(["tag:prod".to_string()]),
                expiration: Some(Utc::now()),
                created_at: Some(Utc::now()),
                key: Some(Secret::new("pak-secret")),
            }),
            Utc::now(),
        )
    }

    #[test]
    fn record_crud() {
        let (store, _dir) = create_test_store();
        let record = pre_auth_key_record("ci");

        // Create
        store.put(&record).unwrap();

        // Read, including the secret
        let retrieved = store.get(&record.address).unwrap().unwrap();
        assert_eq!(retrieved, record);
        let ResourceState::PreAuthKey(state) = &retrieved.state else {
            panic!("wrong state kind");
        };
        assert_eq!(state.key.as_ref().unwrap().expose(), "pak-secret");

        // Update
        let mut updated = record.clone();
        if let ResourceState::PreAuthKey(state) = &mut updated.state {
            state.acl_tags.insert("tag:ci".into());
        }
        store.put(&updated).unwrap();
        assert_eq!(store.get(&record.address).unwrap(), Some(updated));

        // Delete
        store.delete(&record.address).unwrap();
        assert!(store.get(&record.address).unwrap().is_none());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (store, _dir) = create_test_store();
        let address = ResourceAddress::new(ResourceKind::ApiKey, "gone");
        assert!(matches!(store.delete(&address), Err(StoreError::NotFound)));
    }

    #[test]
    fn kinds_are_isolated() {
        let (store, _dir) = create_test_store();

        let tags = StateRecord::new(
            "gateway",
            ResourceState::NodeTags(NodeAttributeState {
                node_id: NodeId::new(7),
                values: BTreeSet::from(["tag:gw".to_string()]),
            }),
            Utc::now(),
        );
        let routes = StateRecord::new(
            "gateway",
            ResourceState::NodeRoutes(NodeAttributeState {
                node_id: NodeId::new(7),
                values: BTreeSet::from(["10.0.0.0/8".to_string()]),
            }),
            Utc::now(),
        );
        store.put(&tags).unwrap();
        store.put(&routes).unwrap();

        assert_eq!(store.list(ResourceKind::NodeTags).unwrap(), vec![tags]);
        assert_eq!(store.list(ResourceKind::NodeRoutes).unwrap(), vec![routes]);
        assert!(store.list(ResourceKind::User).unwrap().is_empty());
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn list_is_ordered_by_name() {
        let (store, _dir) = create_test_store();
        for name in ["zeta", "alpha", "mid"] {
            let record = StateRecord::new(
                name,
                ResourceState::ApiKey(ApiKeyState {
                    prefix: ApiKeyPrefix::new(name),
                    ttl: "2160h".into(),
                    expiration: None,
                    created_at: None,
                    key: None,
                }),
                Utc::now(),
            );
            store.put(&record).unwrap();
        }

        let names: Vec<_> = store
            .list(ResourceKind::ApiKey)
            .unwrap()
            .into_iter()
            .map(|r| r.address.name)
            .collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let record = pre_auth_key_record("persisted");

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.put(&record).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&record.address).unwrap(), Some(record));
    }

    #[test]
    fn put_rejects_mismatched_kind() {
        let (store, _dir) = create_test_store();
        let mut record = pre_auth_key_record("odd");
        record.address.kind = ResourceKind::User;
        assert!(matches!(
            store.put(&record),
            Err(StoreError::KindMismatch { .. })
        ));
    }
}
