//! Observed-state types stored in the database.
//!
//! These types represent what was last seen on the remote service for each
//! managed resource, plus the few input-only fields (such as a key TTL) the
//! replace policy needs to compare against later.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use hsconverge_core::{
    ApiKeyPrefix, NodeId, PreAuthKeyId, ResourceAddress, ResourceKind, Secret, UserId,
};
use serde::{Deserialize, Serialize};

/// Observed state of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Remote-assigned id.
    pub id: UserId,
    /// Current name.
    pub name: String,
    /// Email, absent when the remote reports an empty string.
    pub email: Option<String>,
    /// Display name, absent when the remote reports an empty string.
    pub display_name: Option<String>,
    /// Creation time as reported by the remote.
    pub created_at: Option<DateTime<Utc>>,
}

/// Observed state of a pre-authentication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthKeyState {
    /// Remote-assigned id.
    pub id: PreAuthKeyId,
    /// Owning user.
    pub user_id: UserId,
    /// Whether the key can register more than one node.
    pub reusable: bool,
    /// Whether nodes registered with the key are ephemeral.
    pub ephemeral: bool,
    /// The TTL the key was created with. Input-only; `None` means the default.
    #[serde(default)]
    pub ttl: Option<String>,
    /// ACL tags applied to nodes registered with the key.
    #[serde(default)]
    pub acl_tags: BTreeSet<String>,
    /// When the key stops being valid.
    pub expiration: Option<DateTime<Utc>>,
    /// Creation time as reported by the remote.
    pub created_at: Option<DateTime<Utc>>,
    /// The key secret. Only known for keys created through this store.
    #[serde(default)]
    pub key: Option<Secret>,
}

impl PreAuthKeyState {
    /// Returns true if the key has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expiration, now)
    }
}

/// Observed state of an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyState {
    /// The key prefix, which is its only stable handle.
    pub prefix: ApiKeyPrefix,
    /// The TTL the key was created with.
    pub ttl: String,
    /// When the key stops being valid.
    pub expiration: Option<DateTime<Utc>>,
    /// Creation time as reported by the remote.
    pub created_at: Option<DateTime<Utc>>,
    /// The full key, revealed once at creation.
    #[serde(default)]
    pub key: Option<Secret>,
}

impl ApiKeyState {
    /// Returns true if the key has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expiration, now)
    }
}

/// Observed state of a node attribute set (forced tags or approved routes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributeState {
    /// The decorated node, which is also the resource id.
    pub node_id: NodeId,
    /// The full set as last read back from the remote.
    #[serde(default)]
    pub values: BTreeSet<String>,
}

/// Observed state of any managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceState {
    /// A user account.
    User(UserState),
    /// A pre-authentication key.
    PreAuthKey(PreAuthKeyState),
    /// An API key.
    ApiKey(ApiKeyState),
    /// Forced tags of a node.
    NodeTags(NodeAttributeState),
    /// Approved routes of a node.
    NodeRoutes(NodeAttributeState),
}

impl ResourceState {
    /// The kind of resource this state describes.
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

    /// The remote identifier rendered the way it is imported.
    #[must_use]
    pub fn remote_id(&self) -> String {
        match self {
            Self::User(user) => user.id.to_string(),
            Self::PreAuthKey(key) => format!("{},{}", key.user_id, key.id),
            Self::ApiKey(key) => key.prefix.to_string(),
            Self::NodeTags(set) | Self::NodeRoutes(set) => set.node_id.to_string(),
        }
    }
}

/// A persisted record: where it lives, what was observed, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Stable local address.
    pub address: ResourceAddress,
    /// Last observed state.
    pub state: ResourceState,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    /// Build a record for `name` from observed state, stamped at `now`.
    #[must_use]
    pub fn new(name: impl Into<String>, state: ResourceState, now: DateTime<Utc>) -> Self {
        Self {
            address: ResourceAddress::new(state.kind(), name),
            state,
            updated_at: now,
        }
    }
}

fn is_expired(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiration.is_some_and(|at| now >= at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn pre_auth_key(expiration: Option<DateTime<Utc>>) -> PreAuthKeyState {
        PreAuthKeyState {
            id: PreAuthKeyId::new(9),
            user_id: UserId::new(3),
            reusable: false,
            ephemeral: false,
            ttl: None,
            acl_tags: BTreeSet::new(),
            expiration,
            created_at: None,
            key: Some(Secret::new("secret")),
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let at = pre_auth_key(Some(now));
        assert!(at.is_expired(now));
        assert!(!at.is_expired(now - TimeDelta::nanoseconds(1)));
        assert!(at.is_expired(now + TimeDelta::seconds(1)));
    }

    #[test]
    fn missing_expiration_never_expires() {
        assert!(!pre_auth_key(None).is_expired(Utc::now()));
    }

    #[test]
    fn remote_ids_match_import_format() {
        let state = ResourceState::PreAuthKey(pre_auth_key(None));
        assert_eq!(state.kind(), ResourceKind::PreAuthKey);
        assert_eq!(state.remote_id(), "3,9");

        let state = ResourceState::NodeRoutes(NodeAttributeState {
            node_id: NodeId::new(12),
            values: BTreeSet::new(),
        });
        assert_eq!(state.remote_id(), "12");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let rendered = format!("{:?}", pre_auth_key(None));
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("Secret(***)"));
    }

    #[test]
    fn record_address_follows_state_kind() {
        let record = StateRecord::new(
            "web",
            ResourceState::NodeTags(NodeAttributeState {
                node_id: NodeId::new(1),
                values: BTreeSet::from(["tag:web".to_string()]),
            }),
            Utc::now(),
        );
        assert_eq!(record.address.to_string(), "node_tags.web");

        let json = serde_json::to_value(&record.state).unwrap();
        assert_eq!(json["kind"], "node_tags");
    }
}
