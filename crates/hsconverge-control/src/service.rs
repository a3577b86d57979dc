//! Converger implementation.
//!
//! This module provides the `Converger` trait and `ConvergeService`
//! implementation that drives the per-kind reconcilers and owns the state
//! store. A record is written only after the remote calls it reflects have
//! succeeded, so an interrupted operation never leaves partial state behind.

use std::sync::Arc;

use async_trait::async_trait;
use hsconverge_core::{Clock, ResourceAddress, ResourceKind, SystemClock};
use hsconverge_rpc::HeadscaleClient;
use hsconverge_store::{StateRecord, StateStore};

use crate::api_key::ApiKeyReconciler;
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::node_attributes::{NodeRoutesReconciler, NodeTagsReconciler};
use crate::nodes::NodeLister;
use crate::plan::Plan;
use crate::pre_auth_key::PreAuthKeyReconciler;
use crate::reconciler::Reconciler;
use crate::types::{ConvergeConfig, DesiredResource, NodeSummary, Observation};
use crate::user::UserReconciler;

/// Trait defining the convergence operations.
#[async_trait]
pub trait Converger: Send + Sync {
    /// Converge the resource stored under `name` to `desired`.
    ///
    /// The prior record, if any, is refreshed first and dropped when the
    /// resource is gone. An absent resource is created; a present one is
    /// left alone, updated in place or replaced according to its plan.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Validation` before any remote call for
    /// malformed input, or the first remote or storage failure.
    async fn apply(
        &self,
        ctx: &OpContext,
        name: &str,
        desired: &DesiredResource,
    ) -> Result<StateRecord>;

    /// Re-read a managed resource and persist what was observed.
    ///
    /// Returns `None` (and drops the record) when the resource is gone.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::NotManaged` if no record is held.
    async fn refresh(
        &self,
        ctx: &OpContext,
        address: &ResourceAddress,
    ) -> Result<Option<StateRecord>>;

    /// Delete a managed resource remotely, then drop its record.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::NotManaged` if no record is held, or the
    /// remote failure, in which case the record is kept.
    async fn destroy(&self, ctx: &OpContext, address: &ResourceAddress) -> Result<()>;

    /// Adopt an existing remote resource under `name`.
    ///
    /// Returns `None` when the identified resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::AlreadyManaged` if a record is held at the
    /// address, or a validation error if `id` is malformed.
    async fn import(
        &self,
        ctx: &OpContext,
        kind: ResourceKind,
        name: &str,
        id: &str,
    ) -> Result<Option<StateRecord>>;

    /// List the nodes known to the service.
    async fn list_nodes(&self, ctx: &OpContext) -> Result<Vec<NodeSummary>>;

    /// Every stored record.
    fn records(&self) -> Result<Vec<StateRecord>>;

    /// The stored record at an address.
    fn record(&self, address: &ResourceAddress) -> Result<Option<StateRecord>>;
}

/// The main converger implementation.
pub struct ConvergeService<C, S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ConvergeConfig,
    users: UserReconciler<C>,
    pre_auth_keys: PreAuthKeyReconciler<C>,
    api_keys: ApiKeyReconciler<C>,
    node_tags: NodeTagsReconciler<C>,
    node_routes: NodeRoutesReconciler<C>,
    nodes: NodeLister<C>,
}

impl<C: HeadscaleClient, S: StateStore> ConvergeService<C, S> {
    /// Create a converger using the system clock.
    #[must_use]
    pub fn new(client: Arc<C>, store: Arc<S>, config: ConvergeConfig) -> Self {
        Self::with_clock(client, store, Arc::new(SystemClock), config)
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(client: Arc<C>, store: Arc<S>) -> Self {
        Self::new(client, store, ConvergeConfig::default())
    }

    /// Create a converger reading time from `clock`.
    #[must_use]
    pub fn with_clock(
        client: Arc<C>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: ConvergeConfig,
    ) -> Self {
        Self {
            users: UserReconciler::new(Arc::clone(&client)),
            pre_auth_keys: PreAuthKeyReconciler::new(
                Arc::clone(&client),
                Arc::clone(&clock),
                config.pre_auth_key_default_ttl.clone(),
            ),
            api_keys: ApiKeyReconciler::new(Arc::clone(&client), Arc::clone(&clock)),
            node_tags: NodeTagsReconciler::new(Arc::clone(&client)),
            node_routes: NodeRoutesReconciler::new(Arc::clone(&client)),
            nodes: NodeLister::new(client),
            store,
            clock,
            config,
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConvergeConfig {
        &self.config
    }

    /// Load the stored state at `address` for `reconciler`.
    fn load<R: Reconciler>(
        &self,
        reconciler: &R,
        address: &ResourceAddress,
    ) -> Result<Option<R::State>> {
        let Some(record) = self.store.get(address)? else {
            return Ok(None);
        };
        reconciler
            .from_resource(record.state)
            .map(Some)
            .ok_or_else(|| ReconcileError::StateMismatch {
                address: address.clone(),
                expected: reconciler.kind(),
            })
    }

    fn persist<R: Reconciler>(
        &self,
        reconciler: &R,
        name: &str,
        state: R::State,
    ) -> Result<StateRecord> {
        let record = StateRecord::new(name, reconciler.to_resource(state), self.clock.now());
        self.store.put(&record)?;
        Ok(record)
    }

    /// Read `prior` and drop its record if the resource is gone.
    async fn observe<R: Reconciler>(
        &self,
        ctx: &OpContext,
        reconciler: &R,
        address: &ResourceAddress,
        prior: &R::State,
    ) -> Result<Option<R::State>> {
        match reconciler.read(ctx, prior).await? {
            Observation::Present(state) => Ok(Some(state)),
            Observation::Gone(reason) => {
                tracing::warn!(
                    address = %address,
                    reason = ?reason,
                    "Resource gone; dropping record"
                );
                self.store.delete(address)?;
                Ok(None)
            }
        }
    }

    async fn apply_with<R: Reconciler>(
        &self,
        ctx: &OpContext,
        reconciler: &R,
        name: &str,
        desired: &R::Desired,
    ) -> Result<StateRecord> {
        reconciler.validate(desired)?;

        let address = ResourceAddress::new(reconciler.kind(), name);
        let prior = match self.load(reconciler, &address)? {
            Some(prior) => self.observe(ctx, reconciler, &address, &prior).await?,
            None => None,
        };

        let state = match prior {
            None => {
                let state = reconciler.create(ctx, desired).await?;
                tracing::info!(address = %address, "Created resource");
                state
            }
            Some(prior) => match reconciler.plan(&prior, desired) {
                Plan::NoChange => {
                    tracing::debug!(address = %address, "Resource up to date");
                    prior
                }
                Plan::Update { fields } => {
                    let state = reconciler.update(ctx, &prior, desired).await?;
                    tracing::info!(address = %address, fields = ?fields, "Updated resource");
                    state
                }
                Plan::Replace { fields } => {
                    tracing::info!(address = %address, fields = ?fields, "Replacing resource");
                    reconciler.delete(ctx, &prior).await?;
                    self.store.delete(&address)?;
                    reconciler.create(ctx, desired).await?
                }
            },
        };

        self.persist(reconciler, name, state)
    }

    async fn refresh_with<R: Reconciler>(
        &self,
        ctx: &OpContext,
        reconciler: &R,
        address: &ResourceAddress,
    ) -> Result<Option<StateRecord>> {
        let prior = self
            .load(reconciler, address)?
            .ok_or_else(|| ReconcileError::NotManaged(address.clone()))?;
        match self.observe(ctx, reconciler, address, &prior).await? {
            Some(state) => self.persist(reconciler, &address.name, state).map(Some),
            None => Ok(None),
        }
    }

    async fn destroy_with<R: Reconciler>(
        &self,
        ctx: &OpContext,
        reconciler: &R,
        address: &ResourceAddress,
    ) -> Result<()> {
        let prior = self
            .load(reconciler, address)?
            .ok_or_else(|| ReconcileError::NotManaged(address.clone()))?;
        match reconciler.delete(ctx, &prior).await {
            Ok(()) => tracing::info!(address = %address, "Destroyed resource"),
            Err(err) if err.is_remote_not_found() => {
                tracing::warn!(address = %address, "Resource already gone");
            }
            Err(err) => return Err(err),
        }
        self.store.delete(address)?;
        Ok(())
    }

    async fn import_with<R: Reconciler>(
        &self,
        ctx: &OpContext,
        reconciler: &R,
        name: &str,
        id: &str,
    ) -> Result<Option<StateRecord>> {
        let address = ResourceAddress::new(reconciler.kind(), name);
        if self.store.get(&address)?.is_some() {
            return Err(ReconcileError::AlreadyManaged(address));
        }
        let seed = reconciler.import(id)?;
        match reconciler.read(ctx, &seed).await? {
            Observation::Present(state) => {
                let record = self.persist(reconciler, name, state)?;
                tracing::info!(address = %address, id, "Imported resource");
                Ok(Some(record))
            }
            Observation::Gone(reason) => {
                tracing::warn!(address = %address, id, reason = ?reason, "Nothing to import");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<C: HeadscaleClient + 'static, S: StateStore + 'static> Converger for ConvergeService<C, S> {
    async fn apply(
        &self,
        ctx: &OpContext,
        name: &str,
        desired: &DesiredResource,
    ) -> Result<StateRecord> {
        match desired {
            DesiredResource::User(spec) => self.apply_with(ctx, &self.users, name, spec).await,
            DesiredResource::PreAuthKey(spec) => {
                self.apply_with(ctx, &self.pre_auth_keys, name, spec).await
            }
            DesiredResource::ApiKey(spec) => {
                self.apply_with(ctx, &self.api_keys, name, spec).await
            }
            DesiredResource::NodeTags(spec) => {
                self.apply_with(ctx, &self.node_tags, name, spec).await
            }
            DesiredResource::NodeRoutes(spec) => {
                self.apply_with(ctx, &self.node_routes, name, spec).await
            }
        }
    }

    async fn refresh(
        &self,
        ctx: &OpContext,
        address: &ResourceAddress,
    ) -> Result<Option<StateRecord>> {
        match address.kind {
            ResourceKind::User => self.refresh_with(ctx, &self.users, address).await,
            ResourceKind::PreAuthKey => self.refresh_with(ctx, &self.pre_auth_keys, address).await,
            ResourceKind::ApiKey => self.refresh_with(ctx, &self.api_keys, address).await,
            ResourceKind::NodeTags => self.refresh_with(ctx, &self.node_tags, address).await,
            ResourceKind::NodeRoutes => self.refresh_with(ctx, &self.node_routes, address).await,
        }
    }

    async fn destroy(&self, ctx: &OpContext, address: &ResourceAddress) -> Result<()> {
        match address.kind {
            ResourceKind::User => self.destroy_with(ctx, &self.users, address).await,
            ResourceKind::PreAuthKey => self.destroy_with(ctx, &self.pre_auth_keys, address).await,
            ResourceKind::ApiKey => self.destroy_with(ctx, &self.api_keys, address).await,
            ResourceKind::NodeTags => self.destroy_with(ctx, &self.node_tags, address).await,
            ResourceKind::NodeRoutes => self.destroy_with(ctx, &self.node_routes, address).await,
        }
    }

    async fn import(
        &self,
        ctx: &OpContext,
        kind: ResourceKind,
        name: &str,
        id: &str,
    ) -> Result<Option<StateRecord>> {
        match kind {
            ResourceKind::User => self.import_with(ctx, &self.users, name, id).await,
            ResourceKind::PreAuthKey => {
                self.import_with(ctx, &self.pre_auth_keys, name, id).await
            }
            ResourceKind::ApiKey => self.import_with(ctx, &self.api_keys, name, id).await,
            ResourceKind::NodeTags => self.import_with(ctx, &self.node_tags, name, id).await,
            ResourceKind::NodeRoutes => {
                self.import_with(ctx, &self.node_routes, name, id).await
            }
        }
    }

    async fn list_nodes(&self, ctx: &OpContext) -> Result<Vec<NodeSummary>> {
        self.nodes.list(ctx).await
    }

    fn records(&self) -> Result<Vec<StateRecord>> {
        Ok(self.store.list_all()?)
    }

    fn record(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        Ok(self.store.get(address)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeRoutesSpec, UserSpec};
    use hsconverge_core::ManualClock;
    use hsconverge_rpc::{method, FakeHeadscale};
    use hsconverge_store::{MemoryStore, ResourceState, RocksStore};
    use tempfile::TempDir;

    type Service<S> = ConvergeService<FakeHeadscale, S>;

    fn setup() -> (Service<MemoryStore>, Arc<FakeHeadscale>) {
        let clock = Arc::new(ManualClock::starting_now());
        let fake = Arc::new(FakeHeadscale::new(clock.clone()));
        let service = ConvergeService::with_clock(
            Arc::clone(&fake),
            Arc::new(MemoryStore::new()),
            clock,
            ConvergeConfig::default(),
        );
        (service, fake)
    }

    #[tokio::test]
    async fn apply_creates_then_is_idempotent() {
        let (service, fake) = setup();
        let ctx = OpContext::new();
        let desired = DesiredResource::User(UserSpec::named("alice"));

        let first = service.apply(&ctx, "alice", &desired).await.unwrap();
        let second = service.apply(&ctx, "alice", &desired).await.unwrap();
        assert_eq!(first.state, second.state);
        assert_eq!(fake.calls(method::CREATE_USER), 1);
        assert_eq!(fake.calls(method::RENAME_USER), 0);
        assert_eq!(service.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_and_destroy_require_a_record() {
        let (service, _fake) = setup();
        let ctx = OpContext::new();
        let address = ResourceAddress::new(ResourceKind::User, "nobody");

        assert!(matches!(
            service.refresh(&ctx, &address).await,
            Err(ReconcileError::NotManaged(_))
        ));
        assert!(matches!(
            service.destroy(&ctx, &address).await,
            Err(ReconcileError::NotManaged(_))
        ));
    }

    #[tokio::test]
    async fn import_refuses_managed_address() {
        let (service, _fake) = setup();
        let ctx = OpContext::new();
        let record = service
            .apply(&ctx, "alice", &DesiredResource::User(UserSpec::named("alice")))
            .await
            .unwrap();

        let err = service
            .import(&ctx, ResourceKind::User, "alice", &record.state.remote_id())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::AlreadyManaged(_)));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let fake = Arc::new(FakeHeadscale::new(clock.clone()));
        let node = fake.add_node("gateway", None);
        let desired = DesiredResource::NodeRoutes(NodeRoutesSpec {
            node_id: node.into(),
            routes: ["10.0.0.0/8".to_string()].into(),
        });

        {
            let store = Arc::new(RocksStore::open(dir.path()).unwrap());
            let service: Service<RocksStore> = ConvergeService::with_clock(
                Arc::clone(&fake),
                store,
                clock.clone(),
                ConvergeConfig::default(),
            );
            service
                .apply(&OpContext::new(), "gateway", &desired)
                .await
                .unwrap();
        }

        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let service: Service<RocksStore> =
            ConvergeService::with_clock(fake, store, clock, ConvergeConfig::default());
        let record = service
            .record(&ResourceAddress::new(ResourceKind::NodeRoutes, "gateway"))
            .unwrap()
            .unwrap();
        let ResourceState::NodeRoutes(state) = record.state else {
            panic!("expected node routes");
        };
        assert_eq!(state.node_id.get(), node);
    }
}
