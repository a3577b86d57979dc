//! The client capability the reconcilers are written against.
//!
//! This trait abstracts the gRPC client so reconcilers can be exercised
//! against an in-memory service in tests.

use async_trait::async_trait;
use tonic::Status;

use crate::proto::{
    CreateApiKeyRequest, CreateApiKeyResponse, CreatePreAuthKeyRequest, CreatePreAuthKeyResponse,
    CreateUserRequest, CreateUserResponse, DeleteApiKeyRequest, DeleteApiKeyResponse,
    DeleteUserRequest, DeleteUserResponse, ExpirePreAuthKeyRequest, ExpirePreAuthKeyResponse,
    GetNodeRequest, GetNodeResponse, ListApiKeysRequest, ListApiKeysResponse, ListNodesRequest,
    ListPreAuthKeysRequest, ListPreAuthKeysResponse, ListUsersRequest, ListUsersResponse, Node,
    RenameUserRequest, RenameUserResponse, SetApprovedRoutesRequest, SetApprovedRoutesResponse,
    SetTagsRequest, SetTagsResponse,
};

/// Remote method names, used for request paths, error context and call
/// accounting.
pub mod method {
    /// `CreateUser`
    pub const CREATE_USER: &str = "CreateUser";
    /// `ListUsers`
    pub const LIST_USERS: &str = "ListUsers";
    /// `RenameUser`
    pub const RENAME_USER: &str = "RenameUser";
    /// `DeleteUser`
    pub const DELETE_USER: &str = "DeleteUser";
    /// `CreatePreAuthKey`
    pub const CREATE_PRE_AUTH_KEY: &str = "CreatePreAuthKey";
    /// `ListPreAuthKeys`
    pub const LIST_PRE_AUTH_KEYS: &str = "ListPreAuthKeys";
    /// `ExpirePreAuthKey`
    pub const EXPIRE_PRE_AUTH_KEY: &str = "ExpirePreAuthKey";
    /// `CreateApiKey`
    pub const CREATE_API_KEY: &str = "CreateApiKey";
    /// `ListApiKeys`
    pub const LIST_API_KEYS: &str = "ListApiKeys";
    /// `DeleteApiKey`
    pub const DELETE_API_KEY: &str = "DeleteApiKey";
    /// `GetNode`
    pub const GET_NODE: &str = "GetNode";
    /// `SetTags`
    pub const SET_TAGS: &str = "SetTags";
    /// `SetApprovedRoutes`
    pub const SET_APPROVED_ROUTES: &str = "SetApprovedRoutes";
    /// `ListNodes`
    pub const LIST_NODES: &str = "ListNodes";
}

/// One operation per remote action the reconcilers perform.
///
/// Errors are the verbatim `tonic::Status` returned by the service.
#[async_trait]
pub trait HeadscaleClient: Send + Sync {
    /// Create a user.
    async fn create_user(&self, request: CreateUserRequest)
        -> Result<CreateUserResponse, Status>;

    /// List users matching the request filters.
    async fn list_users(&self, request: ListUsersRequest) -> Result<ListUsersResponse, Status>;

    /// Rename a user.
    async fn rename_user(&self, request: RenameUserRequest)
        -> Result<RenameUserResponse, Status>;

    /// Delete a user.
    async fn delete_user(&self, request: DeleteUserRequest)
        -> Result<DeleteUserResponse, Status>;

    /// Create a pre-authentication key.
    async fn create_pre_auth_key(
        &self,
        request: CreatePreAuthKeyRequest,
    ) -> Result<CreatePreAuthKeyResponse, Status>;

    /// List the pre-authentication keys of one user.
    async fn list_pre_auth_keys(
        &self,
        request: ListPreAuthKeysRequest,
    ) -> Result<ListPreAuthKeysResponse, Status>;

    /// Expire a pre-authentication key.
    async fn expire_pre_auth_key(
        &self,
        request: ExpirePreAuthKeyRequest,
    ) -> Result<ExpirePreAuthKeyResponse, Status>;

    /// Create an API key.
    async fn create_api_key(
        &self,
        request: CreateApiKeyRequest,
    ) -> Result<CreateApiKeyResponse, Status>;

    /// List all API keys.
    async fn list_api_keys(
        &self,
        request: ListApiKeysRequest,
    ) -> Result<ListApiKeysResponse, Status>;

    /// Delete an API key.
    async fn delete_api_key(
        &self,
        request: DeleteApiKeyRequest,
    ) -> Result<DeleteApiKeyResponse, Status>;

    /// Get one node.
    async fn get_node(&self, request: GetNodeRequest) -> Result<GetNodeResponse, Status>;

    /// Replace the forced tags of a node.
    async fn set_tags(&self, request: SetTagsRequest) -> Result<SetTagsResponse, Status>;

    /// Replace the approved routes of a node.
    async fn set_approved_routes(
        &self,
        request: SetApprovedRoutesRequest,
    ) -> Result<SetApprovedRoutesResponse, Status>;

    /// List nodes.
    ///
    /// `Ok(None)` means the service answered without a node list at all,
    /// which callers treat as a contract violation rather than "no nodes".
    async fn list_nodes(&self, request: ListNodesRequest) -> Result<Option<Vec<Node>>, Status>;
}
