//! Desired-state inputs, observations and configuration.
//!
//! Desired records deserialize from `kind`-tagged JSON, for example
//! `{"kind": "pre_auth_key", "user_id": 5, "ttl": "1h", "acl_tags": ["tag:prod"]}`.

use std::collections::BTreeSet;
use std::time::Duration;

use hsconverge_core::{NodeId, ResourceKind, UserId};
use serde::{Deserialize, Serialize};

use crate::context::OpContext;

/// Desired state of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    /// User name. Changing it renames the user.
    pub name: String,
    /// Email. Changing it recreates the user.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name. Changing it recreates the user.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserSpec {
    /// A user with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            display_name: None,
        }
    }
}

/// Desired state of a pre-authentication key. Every field is fixed at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthKeySpec {
    /// Owning user.
    pub user_id: UserId,
    /// Whether the key can register more than one node.
    #[serde(default)]
    pub reusable: bool,
    /// Whether registered nodes are ephemeral.
    #[serde(default)]
    pub ephemeral: bool,
    /// Lifetime such as `"1h"`; the configured default applies when absent.
    #[serde(default)]
    pub ttl: Option<String>,
    /// ACL tags, each `tag:<value>`.
    #[serde(default)]
    pub acl_tags: BTreeSet<String>,
}

impl PreAuthKeySpec {
    /// A single-use, non-ephemeral key for `user_id` with the default TTL.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            reusable: false,
            ephemeral: false,
            ttl: None,
            acl_tags: BTreeSet::new(),
        }
    }
}

/// Desired state of an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeySpec {
    /// Lifetime. Changing it recreates the key.
    #[serde(default = "ApiKeySpec::default_ttl")]
    pub ttl: String,
}

impl ApiKeySpec {
    /// Ninety days.
    pub const DEFAULT_TTL: &'static str = "2160h";

    fn default_ttl() -> String {
        Self::DEFAULT_TTL.to_string()
    }
}

impl Default for ApiKeySpec {
    fn default() -> Self {
        Self {
            ttl: Self::default_ttl(),
        }
    }
}

/// Desired forced tags of an existing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTagsSpec {
    /// The node to decorate.
    pub node_id: NodeId,
    /// The complete tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Desired approved routes of an existing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRoutesSpec {
    /// The node to decorate.
    pub node_id: NodeId,
    /// The complete route set.
    #[serde(default)]
    pub routes: BTreeSet<String>,
}

/// Desired state of any managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesiredResource {
    /// A user account.
    User(UserSpec),
    /// A pre-authentication key.
    PreAuthKey(PreAuthKeySpec),
    /// An API key.
    ApiKey(ApiKeySpec),
    /// Forced tags of a node.
    NodeTags(NodeTagsSpec),
    /// Approved routes of a node.
    NodeRoutes(NodeRoutesSpec),
}

impl DesiredResource {
    /// The kind of resource described.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::User(_) => ResourceKind::User,
            Self::PreAuthKey(_) => ResourceKind::PreAuthKey,
            Self::ApiKey(_) => ResourceKind::ApiKey,
            Self::NodeTags(_) => ResourceKind::NodeTags,
            Self::NodeRoutes(_) => ResourceKind::NodeRoutes,
        }
    }
}

/// Why a previously observed resource is no longer present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoneReason {
    /// The service no longer knows it.
    NotFound,
    /// A key whose expiration has passed.
    Expired,
}

/// The outcome of reading a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The resource exists; here is its current state.
    Present(T),
    /// The resource no longer exists and its record should be dropped.
    Gone(GoneReason),
}

/// One row of the node listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    /// Node id.
    pub id: NodeId,
    /// Node name.
    pub name: String,
    /// Owning user, when the node has one.
    pub user_id: Option<UserId>,
}

/// Configuration for the converger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergeConfig {
    /// Lifetime of pre-auth keys created without a TTL.
    #[serde(default = "ConvergeConfig::default_pre_auth_key_ttl")]
    pub pre_auth_key_default_ttl: String,
    /// Deadline applied by [`ConvergeConfig::context`], in seconds.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            pre_auth_key_default_ttl: Self::default_pre_auth_key_ttl(),
            operation_timeout_secs: None,
        }
    }
}

impl ConvergeConfig {
    fn default_pre_auth_key_ttl() -> String {
        "1h".to_string()
    }

    /// A fresh operation context honoring the configured timeout.
    #[must_use]
    pub fn context(&self) -> OpContext {
        match self.operation_timeout_secs {
            Some(secs) => OpContext::with_timeout(Duration::from_secs(secs)),
            None => OpContext::new(),
        }
    }
}
