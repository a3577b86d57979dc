//! Read-only node listing.

use std::sync::Arc;

use hsconverge_core::{NodeId, UserId};
use hsconverge_rpc::proto::{ListNodesRequest, Node};
use hsconverge_rpc::{method, HeadscaleClient};

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::types::NodeSummary;

/// Projects the service's node list into [`NodeSummary`] rows.
#[derive(Debug)]
pub struct NodeLister<C> {
    client: Arc<C>,
}

impl<C: HeadscaleClient> NodeLister<C> {
    /// Create a lister over `client`.
    pub const fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// List every node. Nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::NullResponse` if the service answers without a
    /// node list, or an error if the call fails.
    pub async fn list(&self, ctx: &OpContext) -> Result<Vec<NodeSummary>> {
        let request = ListNodesRequest {
            user: String::new(),
        };
        let nodes = ctx
            .call(method::LIST_NODES, self.client.list_nodes(request))
            .await?
            .ok_or(ReconcileError::NullResponse {
                operation: method::LIST_NODES,
                what: "node list",
            })?;
        Ok(nodes.into_iter().map(summary).collect())
    }
}

fn summary(node: Node) -> NodeSummary {
    NodeSummary {
        id: NodeId::new(node.id),
        name: node.name,
        user_id: node.user.map(|user| UserId::new(user.id)),
    }
}
