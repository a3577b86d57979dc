//! Error types for reconciliation.
//!
//! This module defines all errors that can occur while converging a
//! resource. Drift (a resource deleted or expired remotely) is not an error;
//! reads report it as [`crate::Observation::Gone`].

use hsconverge_core::{ResourceAddress, ResourceKind, ValidationError};
use hsconverge_store::StoreError;
use thiserror::Error;
use tonic::{Code, Status};

/// A result type using `ReconcileError`.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur in reconciliation operations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A desired-state input failed local validation; no RPC was issued.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The remote service rejected a call. The status is kept verbatim.
    #[error("{operation} failed: {}: {}", status.code(), status.message())]
    Rpc {
        /// The remote method.
        operation: &'static str,
        /// The status returned by the service.
        #[source]
        status: Status,
    },

    /// A field that can only be set at creation was asked to change in place.
    #[error("{kind} cannot be updated in place: {reason}")]
    ImmutableFieldViolation {
        /// The resource kind.
        kind: ResourceKind,
        /// What cannot change.
        reason: &'static str,
    },

    /// The resource kind cannot be imported.
    #[error("{0} does not support import")]
    ImportUnsupported(ResourceKind),

    /// The record lacks the secret needed to act on the remote resource.
    #[error("{kind} {id} has no known secret; it cannot be revoked")]
    MissingSecret {
        /// The resource kind.
        kind: ResourceKind,
        /// The remote id.
        id: String,
    },

    /// The service answered without a payload it is required to return.
    #[error("{operation} returned no {what}")]
    NullResponse {
        /// The remote method.
        operation: &'static str,
        /// The missing payload.
        what: &'static str,
    },

    /// A freshly created resource could not be found when read back.
    #[error("{kind} {id} not found after creation")]
    NotFoundAfterCreate {
        /// The resource kind.
        kind: ResourceKind,
        /// The remote id.
        id: String,
    },

    /// The operation context was cancelled while a call was in flight.
    #[error("{operation} cancelled")]
    Cancelled {
        /// The remote method that was interrupted.
        operation: &'static str,
    },

    /// The operation context deadline passed while a call was in flight.
    #[error("{operation} deadline exceeded")]
    DeadlineExceeded {
        /// The remote method that was interrupted.
        operation: &'static str,
    },

    /// No record is held at the address.
    #[error("{0} is not managed")]
    NotManaged(ResourceAddress),

    /// A record is already held at the address.
    #[error("{0} is already managed")]
    AlreadyManaged(ResourceAddress),

    /// A stored record does not hold state of the kind its address names.
    #[error("record {address} does not hold {expected} state")]
    StateMismatch {
        /// The record address.
        address: ResourceAddress,
        /// The kind the caller expected.
        expected: ResourceKind,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Wrap a status returned by `operation`.
    #[must_use]
    pub const fn rpc(operation: &'static str, status: Status) -> Self {
        Self::Rpc { operation, status }
    }

    /// Returns true if the error was raised before any RPC was issued.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the remote service reported the target as missing.
    #[must_use]
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::Rpc { status, .. } if status.code() == Code::NotFound)
    }

    /// Returns true if this error might be resolved by retrying.
    ///
    /// Nothing in this crate retries; the hint is for callers.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Rpc { status, .. } => matches!(
                status.code(),
                Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
            ),
            Self::DeadlineExceeded { .. } | Self::Store(_) => true,
            _ => false,
        }
    }
}
