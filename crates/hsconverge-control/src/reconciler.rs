//! The per-kind reconciliation contract.

use async_trait::async_trait;
use hsconverge_core::ResourceKind;
use hsconverge_store::ResourceState;

use crate::context::OpContext;
use crate::error::Result;
use crate::plan::Plan;
use crate::types::Observation;

/// Converges one kind of resource.
///
/// Implementations translate between desired state, stored state and the
/// remote service. They never touch the state store; the converger owns
/// persistence and only writes a record once the remote call succeeded.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired-state input.
    type Desired: Send + Sync;
    /// Observed state kept in the store.
    type State: Clone + Send + Sync;

    /// The kind this reconciler handles.
    fn kind(&self) -> ResourceKind;

    /// Check desired state locally.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Validation` for malformed input.
    fn validate(&self, desired: &Self::Desired) -> Result<()>;

    /// Decide how to move from `prior` to `desired`.
    fn plan(&self, prior: &Self::State, desired: &Self::Desired) -> Plan;

    /// Build the seed state for importing the resource identified by `id`.
    /// The seed is completed by a subsequent [`Reconciler::read`].
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Validation` if `id` is malformed, or
    /// `ReconcileError::ImportUnsupported` for kinds that cannot be imported.
    fn import(&self, id: &str) -> Result<Self::State>;

    /// Wrap state for the store.
    fn to_resource(&self, state: Self::State) -> ResourceState;

    /// Unwrap stored state, or `None` if it belongs to another kind.
    fn from_resource(&self, state: ResourceState) -> Option<Self::State>;

    /// Create the resource remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote call fails or its response is incomplete.
    async fn create(&self, ctx: &OpContext, desired: &Self::Desired) -> Result<Self::State>;

    /// Read the current remote state of a previously stored resource.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote call fails for any reason other than the
    /// resource being gone.
    async fn read(&self, ctx: &OpContext, prior: &Self::State)
        -> Result<Observation<Self::State>>;

    /// Apply mutable changes in place.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ImmutableFieldViolation` when the change needs
    /// a replacement, or an error if a remote call fails.
    async fn update(
        &self,
        ctx: &OpContext,
        prior: &Self::State,
        desired: &Self::Desired,
    ) -> Result<Self::State>;

    /// Remove (or revoke) the resource remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote call fails.
    async fn delete(&self, ctx: &OpContext, prior: &Self::State) -> Result<()>;
}
