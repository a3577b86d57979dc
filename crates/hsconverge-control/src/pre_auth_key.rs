//! Pre-authentication keys.
//!
//! Keys are immutable once issued. Deleting one expires it remotely rather
//! than removing it, and that requires the secret returned at creation, so an
//! imported key can be observed but not revoked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use hsconverge_core::{
    parse_duration, validate_tags, Clock, PreAuthKeyId, PreAuthKeyRef, ResourceKind, Secret,
    ValidationError,
};
use hsconverge_rpc::proto::{
    self, CreatePreAuthKeyRequest, ExpirePreAuthKeyRequest, ListPreAuthKeysRequest,
};
use hsconverge_rpc::{method, HeadscaleClient};
use hsconverge_store::{PreAuthKeyState, ResourceState};
use tracing::debug;

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::plan::{self, Plan};
use crate::reconciler::Reconciler;
use crate::types::{GoneReason, Observation, PreAuthKeySpec};

/// Converges pre-authentication keys.
#[derive(Debug)]
pub struct PreAuthKeyReconciler<C> {
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    default_ttl: String,
}

impl<C: HeadscaleClient> PreAuthKeyReconciler<C> {
    /// Create a reconciler. Keys without a TTL live for `default_ttl`.
    pub fn new(client: Arc<C>, clock: Arc<dyn Clock>, default_ttl: impl Into<String>) -> Self {
        Self {
            client,
            clock,
            default_ttl: default_ttl.into(),
        }
    }

    fn lifetime(&self, desired: &PreAuthKeySpec) -> Result<TimeDelta> {
        let ttl = desired.ttl.as_deref().unwrap_or(&self.default_ttl);
        Ok(parse_duration(ttl)?)
    }
}

/// Merge a remote key into the prior state, keeping the input-only fields.
fn refreshed(prior: &PreAuthKeyState, remote: proto::PreAuthKey) -> PreAuthKeyState {
    PreAuthKeyState {
        id: prior.id,
        user_id: prior.user_id,
        reusable: remote.reusable,
        ephemeral: remote.ephemeral,
        ttl: prior.ttl.clone(),
        acl_tags: remote.acl_tags.into_iter().collect(),
        expiration: remote.expiration.as_ref().and_then(proto::from_timestamp),
        created_at: remote.created_at.as_ref().and_then(proto::from_timestamp),
        key: prior.key.clone(),
    }
}

#[async_trait]
impl<C: HeadscaleClient> Reconciler for PreAuthKeyReconciler<C> {
    type Desired = PreAuthKeySpec;
    type State = PreAuthKeyState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::PreAuthKey
    }

    fn validate(&self, desired: &PreAuthKeySpec) -> Result<()> {
        self.lifetime(desired)?;
        validate_tags(&desired.acl_tags)?;
        Ok(())
    }

    fn plan(&self, prior: &PreAuthKeyState, desired: &PreAuthKeySpec) -> Plan {
        plan::pre_auth_key(prior, desired)
    }

    fn import(&self, id: &str) -> Result<PreAuthKeyState> {
        let key_ref: PreAuthKeyRef = id.parse().map_err(|source| ValidationError::InvalidImportId {
            kind: ResourceKind::PreAuthKey,
            source,
        })?;
        Ok(PreAuthKeyState {
            id: key_ref.key_id,
            user_id: key_ref.user_id,
            reusable: false,
            ephemeral: false,
            ttl: None,
            acl_tags: std::collections::BTreeSet::new(),
            expiration: None,
            created_at: None,
            key: None,
        })
    }

    fn to_resource(&self, state: PreAuthKeyState) -> ResourceState {
        ResourceState::PreAuthKey(state)
    }

    fn from_resource(&self, state: ResourceState) -> Option<PreAuthKeyState> {
        match state {
            ResourceState::PreAuthKey(key) => Some(key),
            _ => None,
        }
    }

    async fn create(&self, ctx: &OpContext, desired: &PreAuthKeySpec) -> Result<PreAuthKeyState> {
        let expiration = self.clock.now() + self.lifetime(desired)?;
        let request = CreatePreAuthKeyRequest {
            user: desired.user_id.get(),
            reusable: desired.reusable,
            ephemeral: desired.ephemeral,
            expiration: Some(proto::to_timestamp(expiration)),
            acl_tags: desired.acl_tags.iter().cloned().collect(),
        };
        let response = ctx
            .call(
                method::CREATE_PRE_AUTH_KEY,
                self.client.create_pre_auth_key(request),
            )
            .await?;
        let key = response.pre_auth_key.ok_or(ReconcileError::NullResponse {
            operation: method::CREATE_PRE_AUTH_KEY,
            what: "pre-auth key",
        })?;
        debug!(key_id = key.id, user_id = %desired.user_id, %expiration, "Pre-auth key created");

        Ok(PreAuthKeyState {
            id: PreAuthKeyId::new(key.id),
            user_id: desired.user_id,
            reusable: key.reusable,
            ephemeral: key.ephemeral,
            ttl: desired.ttl.clone(),
            acl_tags: key.acl_tags.into_iter().collect(),
            expiration: key.expiration.as_ref().and_then(proto::from_timestamp),
            created_at: key.created_at.as_ref().and_then(proto::from_timestamp),
            key: Some(Secret::new(key.key)),
        })
    }

    async fn read(
        &self,
        ctx: &OpContext,
        prior: &PreAuthKeyState,
    ) -> Result<Observation<PreAuthKeyState>> {
        let request = ListPreAuthKeysRequest {
            user: prior.user_id.get(),
        };
        let response = match ctx
            .call(
                method::LIST_PRE_AUTH_KEYS,
                self.client.list_pre_auth_keys(request),
            )
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_remote_not_found() => {
                return Ok(Observation::Gone(GoneReason::NotFound))
            }
            Err(err) => return Err(err),
        };

        let Some(remote) = response
            .pre_auth_keys
            .into_iter()
            .find(|key| key.id == prior.id.get())
        else {
            return Ok(Observation::Gone(GoneReason::NotFound));
        };

        let state = refreshed(prior, remote);
        if state.is_expired(self.clock.now()) {
            debug!(key_id = %state.id, "Pre-auth key expired");
            return Ok(Observation::Gone(GoneReason::Expired));
        }
        Ok(Observation::Present(state))
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &PreAuthKeyState,
        _desired: &PreAuthKeySpec,
    ) -> Result<PreAuthKeyState> {
        Err(ReconcileError::ImmutableFieldViolation {
            kind: ResourceKind::PreAuthKey,
            reason: "keys cannot be updated",
        })
    }

    async fn delete(&self, ctx: &OpContext, prior: &PreAuthKeyState) -> Result<()> {
        let key = prior
            .key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ReconcileError::MissingSecret {
                kind: ResourceKind::PreAuthKey,
                id: format!("{},{}", prior.user_id, prior.id),
            })?;
        let request = ExpirePreAuthKeyRequest {
            user: prior.user_id.get(),
            key: key.expose().to_string(),
        };
        ctx.call(
            method::EXPIRE_PRE_AUTH_KEY,
            self.client.expire_pre_auth_key(request),
        )
        .await?;
        Ok(())
    }
}
