//! Reconciliation engine for hsconverge.
//!
//! This crate converges declarative resource descriptions against a Headscale
//! coordination service and keeps the observed state in a local store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                DesiredResource (kind-tagged)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ConvergeService                       │
//! │   load → read (drop if gone) → plan → create/update/replace │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                     │
//!          ▼                   ▼                     ▼
//!   ┌─────────────┐   ┌─────────────────┐   ┌─────────────────┐
//!   │ Reconcilers │──▶│ HeadscaleClient │   │   StateStore    │
//!   │  (per kind) │   │     (gRPC)      │   │ (RocksDB/memory)│
//!   └─────────────┘   └─────────────────┘   └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use hsconverge_control::{ConvergeService, Converger, DesiredResource, UserSpec};
//! use hsconverge_rpc::TransportSettings;
//! use hsconverge_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(TransportSettings::default().resolve_from_env()?.connect()?);
//! let store = Arc::new(RocksStore::open("/var/lib/hsconverge")?);
//! let converger = ConvergeService::with_defaults(client, store);
//!
//! let ctx = converger.config().context();
//! let desired = DesiredResource::User(UserSpec::named("alice"));
//! let record = converger.apply(&ctx, "alice", &desired).await?;
//! println!("{} -> {}", record.address, record.state.remote_id());
//! # Ok(())
//! # }
//! ```
//!
//! # Replace policy
//!
//! | kind | update in place | replace |
//! |------|-----------------|---------|
//! | `user` | `name` | `email`, `display_name` |
//! | `pre_auth_key` | | every field |
//! | `api_key` | | `ttl` |
//! | `node_tags`, `node_routes` | the set | `node_id` |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api_key;
pub mod context;
pub mod error;
pub mod node_attributes;
pub mod nodes;
pub mod plan;
pub mod pre_auth_key;
pub mod reconciler;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod user;

pub use api_key::ApiKeyReconciler;
pub use context::OpContext;
pub use error::{ReconcileError, Result};
pub use node_attributes::{
    NodeAttribute, NodeAttributeReconciler, NodeAttributeSpec, NodeRoutesReconciler,
    NodeTagsReconciler,
};
pub use nodes::NodeLister;
pub use plan::Plan;
pub use pre_auth_key::PreAuthKeyReconciler;
pub use reconciler::Reconciler;
pub use service::{ConvergeService, Converger};
pub use types::{
    ApiKeySpec, ConvergeConfig, DesiredResource, GoneReason, NodeRoutesSpec, NodeSummary,
    NodeTagsSpec, Observation, PreAuthKeySpec, UserSpec,
};
pub use user::UserReconciler;
