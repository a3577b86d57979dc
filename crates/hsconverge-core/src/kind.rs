//! Resource kinds and local resource addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of resource kinds the reconciler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A user account.
    User,
    /// A pre-authentication key used to register nodes.
    PreAuthKey,
    /// An administrative API key.
    ApiKey,
    /// The forced ACL tags of an existing node.
    NodeTags,
    /// The approved routes of an existing node.
    NodeRoutes,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::User,
        Self::PreAuthKey,
        Self::ApiKey,
        Self::NodeTags,
        Self::NodeRoutes,
    ];

    /// The snake-case name used in addresses and serialized records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::PreAuthKey => "pre_auth_key",
            Self::ApiKey => "api_key",
            Self::NodeTags => "node_tags",
            Self::NodeRoutes => "node_routes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Returned when a string does not name a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind: {0}")]
pub struct UnknownKind(pub String);

/// The stable local key of a managed resource: its kind plus a caller-chosen
/// name, rendered as `kind.name` (for example `user.alice`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceAddress {
    /// The resource kind.
    pub kind: ResourceKind,
    /// The local name, unique within the kind.
    pub name: String,
}

impl ResourceAddress {
    /// Build an address from a kind and a local name.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}
