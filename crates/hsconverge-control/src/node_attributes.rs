//! Node attribute sets: forced tags and approved routes.
//!
//! Both are full-set attributes of a node that already exists. Creating one
//! sends the desired set, updating re-sends it, and deleting sends the empty
//! set while leaving the node itself alone. The two differ only in the remote
//! call, the validation pattern and which node field they read back.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use hsconverge_core::{validate_routes, validate_tags, NodeId, ResourceKind, ValidationError};
use hsconverge_rpc::proto::{GetNodeRequest, Node, SetApprovedRoutesRequest, SetTagsRequest};
use hsconverge_rpc::{method, HeadscaleClient};
use hsconverge_store::{NodeAttributeState, ResourceState};
use tracing::debug;

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::plan::{self, Plan};
use crate::reconciler::Reconciler;
use crate::types::{GoneReason, NodeRoutesSpec, NodeTagsSpec, Observation};

/// Which node attribute a reconciler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAttribute {
    /// Forced ACL tags.
    Tags,
    /// Approved subnet routes.
    Routes,
}

impl NodeAttribute {
    /// The resource kind.
    #[must_use]
    pub const fn kind(self) -> ResourceKind {
        match self {
            Self::Tags => ResourceKind::NodeTags,
            Self::Routes => ResourceKind::NodeRoutes,
        }
    }

    /// The remote method that replaces the set.
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::Tags => method::SET_TAGS,
            Self::Routes => method::SET_APPROVED_ROUTES,
        }
    }

    /// The desired-state field holding the set.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Routes => "routes",
        }
    }

    fn validate(self, values: &BTreeSet<String>) -> hsconverge_core::Result<()> {
        match self {
            Self::Tags => validate_tags(values),
            Self::Routes => validate_routes(values),
        }
    }

    fn observed(self, node: &Node) -> BTreeSet<String> {
        let values = match self {
            Self::Tags => &node.forced_tags,
            Self::Routes => &node.approved_routes,
        };
        values.iter().cloned().collect()
    }

    fn wrap(self, state: NodeAttributeState) -> ResourceState {
        match self {
            Self::Tags => ResourceState::NodeTags(state),
            Self::Routes => ResourceState::NodeRoutes(state),
        }
    }

    fn unwrap(self, state: ResourceState) -> Option<NodeAttributeState> {
        match (self, state) {
            (Self::Tags, ResourceState::NodeTags(state))
            | (Self::Routes, ResourceState::NodeRoutes(state)) => Some(state),
            _ => None,
        }
    }
}

/// Desired state of a node attribute set.
pub trait NodeAttributeSpec: Send + Sync {
    /// The attribute described.
    const ATTRIBUTE: NodeAttribute;

    /// The decorated node.
    fn node_id(&self) -> NodeId;

    /// The complete desired set.
    fn values(&self) -> &BTreeSet<String>;
}

impl NodeAttributeSpec for NodeTagsSpec {
    const ATTRIBUTE: NodeAttribute = NodeAttribute::Tags;

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn values(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

impl NodeAttributeSpec for NodeRoutesSpec {
    const ATTRIBUTE: NodeAttribute = NodeAttribute::Routes;

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn values(&self) -> &BTreeSet<String> {
        &self.routes
    }
}

/// Converges one attribute set of a node.
#[derive(Debug)]
pub struct NodeAttributeReconciler<C, S> {
    client: Arc<C>,
    spec: PhantomData<fn() -> S>,
}

/// Converges forced node tags.
pub type NodeTagsReconciler<C> = NodeAttributeReconciler<C, NodeTagsSpec>;

/// Converges approved node routes.
pub type NodeRoutesReconciler<C> = NodeAttributeReconciler<C, NodeRoutesSpec>;

impl<C: HeadscaleClient, S: NodeAttributeSpec> NodeAttributeReconciler<C, S> {
    /// Create a reconciler over `client`.
    pub const fn new(client: Arc<C>) -> Self {
        Self {
            client,
            spec: PhantomData,
        }
    }

    async fn set(
        &self,
        ctx: &OpContext,
        node_id: NodeId,
        values: &BTreeSet<String>,
    ) -> Result<NodeAttributeState> {
        let attribute = S::ATTRIBUTE;
        let values: Vec<String> = values.iter().cloned().collect();
        let node = match attribute {
            NodeAttribute::Tags => {
                let request = SetTagsRequest {
                    node_id: node_id.get(),
                    tags: values,
                };
                ctx.call(method::SET_TAGS, self.client.set_tags(request))
                    .await?
                    .node
            }
            NodeAttribute::Routes => {
                let request = SetApprovedRoutesRequest {
                    node_id: node_id.get(),
                    routes: values,
                };
                ctx.call(
                    method::SET_APPROVED_ROUTES,
                    self.client.set_approved_routes(request),
                )
                .await?
                .node
            }
        };
        let node = node.ok_or(ReconcileError::NullResponse {
            operation: attribute.operation(),
            what: "node",
        })?;
        let state = NodeAttributeState {
            node_id,
            values: attribute.observed(&node),
        };
        debug!(node_id = %node_id, kind = %attribute.kind(), count = state.values.len(), "Node attribute set");
        Ok(state)
    }
}

#[async_trait]
impl<C: HeadscaleClient, S: NodeAttributeSpec> Reconciler for NodeAttributeReconciler<C, S> {
    type Desired = S;
    type State = NodeAttributeState;

    fn kind(&self) -> ResourceKind {
        S::ATTRIBUTE.kind()
    }

    fn validate(&self, desired: &S) -> Result<()> {
        S::ATTRIBUTE.validate(desired.values())?;
        Ok(())
    }

    fn plan(&self, prior: &NodeAttributeState, desired: &S) -> Plan {
        plan::node_attribute(
            prior,
            desired.node_id(),
            desired.values(),
            S::ATTRIBUTE.field(),
        )
    }

    fn import(&self, id: &str) -> Result<NodeAttributeState> {
        let node_id: NodeId = id.parse().map_err(|source| ValidationError::InvalidImportId {
            kind: S::ATTRIBUTE.kind(),
            source,
        })?;
        Ok(NodeAttributeState {
            node_id,
            values: BTreeSet::new(),
        })
    }

    fn to_resource(&self, state: NodeAttributeState) -> ResourceState {
        S::ATTRIBUTE.wrap(state)
    }

    fn from_resource(&self, state: ResourceState) -> Option<NodeAttributeState> {
        S::ATTRIBUTE.unwrap(state)
    }

    async fn create(&self, ctx: &OpContext, desired: &S) -> Result<NodeAttributeState> {
        self.set(ctx, desired.node_id(), desired.values()).await
    }

    async fn read(
        &self,
        ctx: &OpContext,
        prior: &NodeAttributeState,
    ) -> Result<Observation<NodeAttributeState>> {
        let request = GetNodeRequest {
            node_id: prior.node_id.get(),
        };
        let node = match ctx.call(method::GET_NODE, self.client.get_node(request)).await {
            Ok(response) => response.node,
            Err(err) if err.is_remote_not_found() => None,
            Err(err) => return Err(err),
        };
        Ok(node.map_or(Observation::Gone(GoneReason::NotFound), |node| {
            Observation::Present(NodeAttributeState {
                node_id: prior.node_id,
                values: S::ATTRIBUTE.observed(&node),
            })
        }))
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &NodeAttributeState,
        desired: &S,
    ) -> Result<NodeAttributeState> {
        if prior.node_id != desired.node_id() {
            return Err(ReconcileError::ImmutableFieldViolation {
                kind: S::ATTRIBUTE.kind(),
                reason: "the node cannot change",
            });
        }
        self.set(ctx, prior.node_id, desired.values()).await
    }

    async fn delete(&self, ctx: &OpContext, prior: &NodeAttributeState) -> Result<()> {
        self.set(ctx, prior.node_id, &BTreeSet::new()).await?;
        Ok(())
    }
}
