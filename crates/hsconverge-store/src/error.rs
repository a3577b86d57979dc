//! Error types for the storage layer.

use hsconverge_core::{ResourceAddress, ResourceKind};
use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A record's state does not belong to the kind named by its address.
    #[error("record {address} holds {actual} state")]
    KindMismatch {
        /// The address the record was filed under.
        address: ResourceAddress,
        /// The kind of the state it carries.
        actual: ResourceKind,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}
