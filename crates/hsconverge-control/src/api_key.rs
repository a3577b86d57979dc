//! API keys.

use std::sync::Arc;

use async_trait::async_trait;
use hsconverge_core::{parse_duration, ApiKeyPrefix, Clock, ResourceKind, Secret};
use hsconverge_rpc::proto::{self, CreateApiKeyRequest, DeleteApiKeyRequest, ListApiKeysRequest};
use hsconverge_rpc::{method, HeadscaleClient};
use hsconverge_store::{ApiKeyState, ResourceState};
use tracing::debug;

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::plan::{self, Plan};
use crate::reconciler::Reconciler;
use crate::types::{ApiKeySpec, GoneReason, Observation};

/// Converges API keys.
///
/// The service identifies a key only by the prefix of its secret, and lists
/// are the only way to read one back.
#[derive(Debug)]
pub struct ApiKeyReconciler<C> {
    client: Arc<C>,
    clock: Arc<dyn Clock>,
}

impl<C: HeadscaleClient> ApiKeyReconciler<C> {
    /// Create a reconciler over `client`.
    pub fn new(client: Arc<C>, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    async fn find(&self, ctx: &OpContext, prefix: &ApiKeyPrefix) -> Result<Option<proto::ApiKey>> {
        let response = ctx
            .call(
                method::LIST_API_KEYS,
                self.client.list_api_keys(ListApiKeysRequest {}),
            )
            .await?;
        Ok(response
            .api_keys
            .into_iter()
            .find(|key| key.prefix == prefix.as_str()))
    }
}

fn with_remote(mut state: ApiKeyState, remote: &proto::ApiKey) -> ApiKeyState {
    state.expiration = remote.expiration.as_ref().and_then(proto::from_timestamp);
    state.created_at = remote.created_at.as_ref().and_then(proto::from_timestamp);
    state
}

#[async_trait]
impl<C: HeadscaleClient> Reconciler for ApiKeyReconciler<C> {
    type Desired = ApiKeySpec;
    type State = ApiKeyState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ApiKey
    }

    fn validate(&self, desired: &ApiKeySpec) -> Result<()> {
        parse_duration(&desired.ttl)?;
        Ok(())
    }

    fn plan(&self, prior: &ApiKeyState, desired: &ApiKeySpec) -> Plan {
        plan::api_key(prior, desired)
    }

    fn import(&self, _id: &str) -> Result<ApiKeyState> {
        Err(ReconcileError::ImportUnsupported(ResourceKind::ApiKey))
    }

    fn to_resource(&self, state: ApiKeyState) -> ResourceState {
        ResourceState::ApiKey(state)
    }

    fn from_resource(&self, state: ResourceState) -> Option<ApiKeyState> {
        match state {
            ResourceState::ApiKey(key) => Some(key),
            _ => None,
        }
    }

    async fn create(&self, ctx: &OpContext, desired: &ApiKeySpec) -> Result<ApiKeyState> {
        let expiration = self.clock.now() + parse_duration(&desired.ttl)?;
        let request = CreateApiKeyRequest {
            expiration: Some(proto::to_timestamp(expiration)),
        };
        let response = ctx
            .call(method::CREATE_API_KEY, self.client.create_api_key(request))
            .await?;
        let prefix = ApiKeyPrefix::from_secret(&response.api_key);
        debug!(%prefix, %expiration, "API key created");

        let remote = self
            .find(ctx, &prefix)
            .await?
            .ok_or_else(|| ReconcileError::NotFoundAfterCreate {
                kind: ResourceKind::ApiKey,
                id: prefix.to_string(),
            })?;
        let state = ApiKeyState {
            prefix,
            ttl: desired.ttl.clone(),
            expiration: None,
            created_at: None,
            key: Some(Secret::new(response.api_key)),
        };
        Ok(with_remote(state, &remote))
    }

    async fn read(&self, ctx: &OpContext, prior: &ApiKeyState) -> Result<Observation<ApiKeyState>> {
        let Some(remote) = self.find(ctx, &prior.prefix).await? else {
            return Ok(Observation::Gone(GoneReason::NotFound));
        };
        let state = with_remote(prior.clone(), &remote);
        if state.is_expired(self.clock.now()) {
            debug!(prefix = %state.prefix, "API key expired");
            return Ok(Observation::Gone(GoneReason::Expired));
        }
        Ok(Observation::Present(state))
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &ApiKeyState,
        _desired: &ApiKeySpec,
    ) -> Result<ApiKeyState> {
        Err(ReconcileError::ImmutableFieldViolation {
            kind: ResourceKind::ApiKey,
            reason: "keys cannot be updated",
        })
    }

    async fn delete(&self, ctx: &OpContext, prior: &ApiKeyState) -> Result<()> {
        let request = DeleteApiKeyRequest {
            prefix: prior.prefix.to_string(),
        };
        ctx.call(method::DELETE_API_KEY, self.client.delete_api_key(request))
            .await?;
        Ok(())
    }
}
