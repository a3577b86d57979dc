//! Observed-state storage for hsconverge.
//!
//! This crate persists the last observed state of every managed resource,
//! keyed by its local address (`kind.name`). The reconciler reads prior state
//! from here before converging and writes the new observation afterwards.
//!
//! # Architecture
//!
//! `RocksStore` uses one column family per resource kind:
//!
//! - `users`: User records
//! - `pre_auth_keys`: Pre-authentication key records
//! - `api_keys`: API key records
//! - `node_tags`: Node tag set records
//! - `node_routes`: Node route set records
//!
//! Values are CBOR-encoded [`StateRecord`]s keyed by local name.
//! `MemoryStore` offers the same contract without touching disk.
//!
//! # Example
//!
//! ```no_run
//! use hsconverge_core::{ResourceAddress, ResourceKind};
//! use hsconverge_store::{RocksStore, StateStore};
//!
//! let store = RocksStore::open("/tmp/hsconverge-db").unwrap();
//!
//! let address = ResourceAddress::new(ResourceKind::User, "alice");
//! let record = store.get(&address).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::{
    ApiKeyState, NodeAttributeState, PreAuthKeyState, ResourceState, StateRecord, UserState,
};

use hsconverge_core::{ResourceAddress, ResourceKind};

/// The storage trait defining all state operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB`, in-memory for testing).
pub trait StateStore: Send + Sync {
    /// Insert or replace a record at its address.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KindMismatch` if the record's state does not
    /// match its address kind, or an error if the database operation fails.
    fn put(&self, record: &StateRecord) -> Result<()>;

    /// Get the record at an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>>;

    /// Delete the record at an address.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record exists there.
    fn delete(&self, address: &ResourceAddress) -> Result<()>;

    /// List every record of one kind, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list(&self, kind: ResourceKind) -> Result<Vec<StateRecord>>;

    /// List every record of every kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all(&self) -> Result<Vec<StateRecord>> {
        let mut records = Vec::new();
        for kind in ResourceKind::ALL {
            records.extend(self.list(kind)?);
        }
        Ok(records)
    }
}

pub(crate) fn check_kind(record: &StateRecord) -> Result<()> {
    let actual = record.state.kind();
    if actual == record.address.kind {
        Ok(())
    } else {
        Err(StoreError::KindMismatch {
            address: record.address.clone(),
            actual,
        })
    }
}
