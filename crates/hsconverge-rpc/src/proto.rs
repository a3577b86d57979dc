//! Wire messages of the `headscale.v1.HeadscaleService` API.
//!
//! Declared by hand with `prost` derives rather than generated from the
//! `.proto` files. Only the fields the reconciler reads or writes are
//! declared; unknown fields on the wire are skipped by the decoder.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

/// Fully qualified service name.
pub const SERVICE: &str = "headscale.v1.HeadscaleService";

// ============================================================================
// Users
// ============================================================================

/// A user account.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    /// Remote-assigned id.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Unique user name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Creation time.
    #[prost(message, optional, tag = "3")]
    pub created_at: Option<Timestamp>,
    /// Display name; empty when unset.
    #[prost(string, tag = "4")]
    pub display_name: String,
    /// Email; empty when unset.
    #[prost(string, tag = "5")]
    pub email: String,
}

/// Request for `CreateUser`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateUserRequest {
    /// User name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Display name; empty for none.
    #[prost(string, tag = "2")]
    pub display_name: String,
    /// Email; empty for none.
    #[prost(string, tag = "3")]
    pub email: String,
}

/// Response of `CreateUser`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateUserResponse {
    /// The created user.
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

/// Request for `RenameUser`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RenameUserRequest {
    /// Id of the user to rename.
    #[prost(uint64, tag = "1")]
    pub old_id: u64,
    /// The new name.
    #[prost(string, tag = "2")]
    pub new_name: String,
}

/// Response of `RenameUser`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RenameUserResponse {
    /// The renamed user.
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

/// Request for `DeleteUser`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteUserRequest {
    /// Id of the user to delete.
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

/// Response of `DeleteUser`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteUserResponse {}

/// Request for `ListUsers`. Zero or empty fields do not filter.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListUsersRequest {
    /// Filter by id.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Filter by name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Filter by email.
    #[prost(string, tag = "3")]
    pub email: String,
}

/// Response of `ListUsers`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListUsersResponse {
    /// Matching users.
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<User>,
}

// ============================================================================
// Pre-auth keys
// ============================================================================

/// A pre-authentication key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreAuthKey {
    /// Owning user.
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
    /// Remote-assigned id.
    #[prost(uint64, tag = "2")]
    pub id: u64,
    /// The key secret.
    #[prost(string, tag = "3")]
    pub key: String,
    /// Whether the key can be used more than once.
    #[prost(bool, tag = "4")]
    pub reusable: bool,
    /// Whether registered nodes are ephemeral.
    #[prost(bool, tag = "5")]
    pub ephemeral: bool,
    /// Whether the key has been used.
    #[prost(bool, tag = "6")]
    pub used: bool,
    /// Expiry time.
    #[prost(message, optional, tag = "7")]
    pub expiration: Option<Timestamp>,
    /// Creation time.
    #[prost(message, optional, tag = "8")]
    pub created_at: Option<Timestamp>,
    /// ACL tags applied to registered nodes.
    #[prost(string, repeated, tag = "9")]
    pub acl_tags: Vec<String>,
}

/// Request for `CreatePreAuthKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreatePreAuthKeyRequest {
    /// Owning user id.
    #[prost(uint64, tag = "1")]
    pub user: u64,
    /// Reusable flag.
    #[prost(bool, tag = "2")]
    pub reusable: bool,
    /// Ephemeral flag.
    #[prost(bool, tag = "3")]
    pub ephemeral: bool,
    /// Expiry time.
    #[prost(message, optional, tag = "4")]
    pub expiration: Option<Timestamp>,
    /// ACL tags.
    #[prost(string, repeated, tag = "5")]
    pub acl_tags: Vec<String>,
}

/// Response of `CreatePreAuthKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreatePreAuthKeyResponse {
    /// The created key, including its secret.
    #[prost(message, optional, tag = "1")]
    pub pre_auth_key: Option<PreAuthKey>,
}

/// Request for `ExpirePreAuthKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExpirePreAuthKeyRequest {
    /// Owning user id.
    #[prost(uint64, tag = "1")]
    pub user: u64,
    /// The key secret.
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Response of `ExpirePreAuthKey`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ExpirePreAuthKeyResponse {}

/// Request for `ListPreAuthKeys`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ListPreAuthKeysRequest {
    /// Owning user id.
    #[prost(uint64, tag = "1")]
    pub user: u64,
}

/// Response of `ListPreAuthKeys`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPreAuthKeysResponse {
    /// Keys of the user.
    #[prost(message, repeated, tag = "1")]
    pub pre_auth_keys: Vec<PreAuthKey>,
}

// ============================================================================
// API keys
// ============================================================================

/// An API key, without its secret.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiKey {
    /// Remote-assigned numeric id.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Non-secret prefix.
    #[prost(string, tag = "2")]
    pub prefix: String,
    /// Expiry time.
    #[prost(message, optional, tag = "3")]
    pub expiration: Option<Timestamp>,
    /// Creation time.
    #[prost(message, optional, tag = "4")]
    pub created_at: Option<Timestamp>,
    /// Last use.
    #[prost(message, optional, tag = "5")]
    pub last_seen: Option<Timestamp>,
}

/// Request for `CreateApiKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateApiKeyRequest {
    /// Expiry time.
    #[prost(message, optional, tag = "1")]
    pub expiration: Option<Timestamp>,
}

/// Response of `CreateApiKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateApiKeyResponse {
    /// The full key, `prefix.secret`.
    #[prost(string, tag = "1")]
    pub api_key: String,
}

/// Request for `ListApiKeys`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ListApiKeysRequest {}

/// Response of `ListApiKeys`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListApiKeysResponse {
    /// All API keys.
    #[prost(message, repeated, tag = "1")]
    pub api_keys: Vec<ApiKey>,
}

/// Request for `DeleteApiKey`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteApiKeyRequest {
    /// Prefix of the key to delete.
    #[prost(string, tag = "1")]
    pub prefix: String,
}

/// Response of `DeleteApiKey`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteApiKeyResponse {}

// ============================================================================
// Nodes
// ============================================================================

/// A registered node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    /// Remote-assigned id.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Host name.
    #[prost(string, tag = "6")]
    pub name: String,
    /// Owning user.
    #[prost(message, optional, tag = "7")]
    pub user: Option<User>,
    /// Registration time.
    #[prost(message, optional, tag = "12")]
    pub created_at: Option<Timestamp>,
    /// Tags forced by an administrator.
    #[prost(string, repeated, tag = "18")]
    pub forced_tags: Vec<String>,
    /// Administrator-assigned name.
    #[prost(string, tag = "21")]
    pub given_name: String,
    /// Whether the node is connected.
    #[prost(bool, tag = "22")]
    pub online: bool,
    /// Routes approved for the node.
    #[prost(string, repeated, tag = "23")]
    pub approved_routes: Vec<String>,
    /// Routes the node announces.
    #[prost(string, repeated, tag = "24")]
    pub available_routes: Vec<String>,
}

/// Request for `GetNode`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetNodeRequest {
    /// Node id.
    #[prost(uint64, tag = "1")]
    pub node_id: u64,
}

/// Response of `GetNode`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNodeResponse {
    /// The node, if it exists.
    #[prost(message, optional, tag = "1")]
    pub node: Option<Node>,
}

/// Request for `SetTags`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetTagsRequest {
    /// Node id.
    #[prost(uint64, tag = "1")]
    pub node_id: u64,
    /// The complete tag set.
    #[prost(string, repeated, tag = "2")]
    pub tags: Vec<String>,
}

/// Response of `SetTags`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetTagsResponse {
    /// The updated node.
    #[prost(message, optional, tag = "1")]
    pub node: Option<Node>,
}

/// Request for `SetApprovedRoutes`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetApprovedRoutesRequest {
    /// Node id.
    #[prost(uint64, tag = "1")]
    pub node_id: u64,
    /// The complete route set.
    #[prost(string, repeated, tag = "2")]
    pub routes: Vec<String>,
}

/// Response of `SetApprovedRoutes`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetApprovedRoutesResponse {
    /// The updated node.
    #[prost(message, optional, tag = "1")]
    pub node: Option<Node>,
}

/// Request for `ListNodes`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListNodesRequest {
    /// Filter by owning user name; empty for all nodes.
    #[prost(string, tag = "1")]
    pub user: String,
}

/// Response of `ListNodes`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListNodesResponse {
    /// Matching nodes.
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,
}

// ============================================================================
// Timestamps
// ============================================================================

/// Convert a wall-clock time to a protobuf timestamp.
#[must_use]
pub fn to_timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: i32::try_from(at.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}

/// Convert a protobuf timestamp to wall-clock time.
///
/// Returns `None` for out-of-range or negative-nanosecond values.
#[must_use]
pub fn from_timestamp(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn timestamps_keep_nanoseconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let ts = to_timestamp(at);
        assert_eq!(ts.seconds, 1_700_000_000);
        assert_eq!(ts.nanos, 123_456_789);
        assert_eq!(from_timestamp(&ts), Some(at));
    }

    #[test]
    fn negative_nanos_are_rejected() {
        let ts = Timestamp {
            seconds: 0,
            nanos: -1,
        };
        assert_eq!(from_timestamp(&ts), None);
    }

    #[test]
    fn node_fields_use_service_tags() {
        let node = Node {
            id: 7,
            forced_tags: vec!["tag:a".into()],
            approved_routes: vec!["10.0.0.0/8".into()],
            ..Node::default()
        };
        let bytes = node.encode_to_vec();

        // field 1 varint, then field 18 (length-delimited), then field 23
        assert_eq!(&bytes[..2], &[0x08, 7]);
        assert!(bytes.windows(2).any(|w| w == [0x92, 0x01]));
        assert!(bytes.windows(2).any(|w| w == [0xba, 0x01]));

        let decoded = Node::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, node);
    }
}
