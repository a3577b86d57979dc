//! gRPC implementation of [`HeadscaleClient`].

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::client::{method, HeadscaleClient};
use crate::proto::{
    CreateApiKeyRequest, CreateApiKeyResponse, CreatePreAuthKeyRequest, CreatePreAuthKeyResponse,
    CreateUserRequest, CreateUserResponse, DeleteApiKeyRequest, DeleteApiKeyResponse,
    DeleteUserRequest, DeleteUserResponse, ExpirePreAuthKeyRequest, ExpirePreAuthKeyResponse,
    GetNodeRequest, GetNodeResponse, ListApiKeysRequest, ListApiKeysResponse, ListNodesRequest,
    ListNodesResponse, ListPreAuthKeysRequest, ListPreAuthKeysResponse, ListUsersRequest,
    ListUsersResponse, Node, RenameUserRequest, RenameUserResponse, SetApprovedRoutesRequest,
    SetApprovedRoutesResponse, SetTagsRequest, SetTagsResponse,
};

/// Adds `authorization: Bearer <token>` to every request when a token is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    header: Option<AsciiMetadataValue>,
}

impl BearerAuth {
    /// Create an interceptor from a ready-made header value.
    #[must_use]
    pub const fn new(header: Option<AsciiMetadataValue>) -> Self {
        Self { header }
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(header) = &self.header {
            request
                .metadata_mut()
                .insert("authorization", header.clone());
        }
        Ok(request)
    }
}

/// A `HeadscaleClient` over one shared gRPC channel.
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Debug, Clone)]
pub struct GrpcHeadscaleClient {
    inner: Grpc<InterceptedService<Channel, BearerAuth>>,
}

impl GrpcHeadscaleClient {
    /// Wrap a channel.
    #[must_use]
    pub fn new(channel: Channel, auth: BearerAuth) -> Self {
        Self {
            inner: Grpc::new(InterceptedService::new(channel, auth)),
        }
    }

    async fn unary<Req, Resp>(&self, name: &'static str, path: &'static str, message: Req)
        -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;

        tracing::trace!(method = name, "Calling headscale");
        let response = grpc
            .unary(
                Request::new(message),
                PathAndQuery::from_static(path),
                ProstCodec::default(),
            )
            .await?;
        Ok(response.into_inner())
    }
}

macro_rules! path {
    ($method:literal) => {
        concat!("/headscale.v1.HeadscaleService/", $method)
    };
}

#[async_trait]
impl HeadscaleClient for GrpcHeadscaleClient {
    async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<CreateUserResponse, Status> {
        self.unary(method::CREATE_USER, path!("CreateUser"), request)
            .await
    }

    async fn list_users(&self, request: ListUsersRequest) -> Result<ListUsersResponse, Status> {
        self.unary(method::LIST_USERS, path!("ListUsers"), request)
            .await
    }

    async fn rename_user(
        &self,
        request: RenameUserRequest,
    ) -> Result<RenameUserResponse, Status> {
        self.unary(method::RENAME_USER, path!("RenameUser"), request)
            .await
    }

    async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, Status> {
        self.unary(method::DELETE_USER, path!("DeleteUser"), request)
            .await
    }

    async fn create_pre_auth_key(
        &self,
        request: CreatePreAuthKeyRequest,
    ) -> Result<CreatePreAuthKeyResponse, Status> {
        self.unary(
            method::CREATE_PRE_AUTH_KEY,
            path!("CreatePreAuthKey"),
            request,
        )
        .await
    }

    async fn list_pre_auth_keys(
        &self,
        request: ListPreAuthKeysRequest,
    ) -> Result<ListPreAuthKeysResponse, Status> {
        self.unary(method::LIST_PRE_AUTH_KEYS, path!("ListPreAuthKeys"), request)
            .await
    }

    async fn expire_pre_auth_key(
        &self,
        request: ExpirePreAuthKeyRequest,
    ) -> Result<ExpirePreAuthKeyResponse, Status> {
        self.unary(
            method::EXPIRE_PRE_AUTH_KEY,
            path!("ExpirePreAuthKey"),
            request,
        )
        .await
    }

    async fn create_api_key(
        &self,
        request: CreateApiKeyRequest,
    ) -> Result<CreateApiKeyResponse, Status> {
        self.unary(method::CREATE_API_KEY, path!("CreateApiKey"), request)
            .await
    }

    async fn list_api_keys(
        &self,
        request: ListApiKeysRequest,
    ) -> Result<ListApiKeysResponse, Status> {
        self.unary(method::LIST_API_KEYS, path!("ListApiKeys"), request)
            .await
    }

    async fn delete_api_key(
        &self,
        request: DeleteApiKeyRequest,
    ) -> Result<DeleteApiKeyResponse, Status> {
        self.unary(method::DELETE_API_KEY, path!("DeleteApiKey"), request)
            .await
    }

    async fn get_node(&self, request: GetNodeRequest) -> Result<GetNodeResponse, Status> {
        self.unary(method::GET_NODE, path!("GetNode"), request)
            .await
    }

    async fn set_tags(&self, request: SetTagsRequest) -> Result<SetTagsResponse, Status> {
        self.unary(method::SET_TAGS, path!("SetTags"), request)
            .await
    }

    async fn set_approved_routes(
        &self,
        request: SetApprovedRoutesRequest,
    ) -> Result<SetApprovedRoutesResponse, Status> {
        self.unary(
            method::SET_APPROVED_ROUTES,
            path!("SetApprovedRoutes"),
            request,
        )
        .await
    }

    async fn list_nodes(&self, request: ListNodesRequest) -> Result<Option<Vec<Node>>, Status> {
        // A protobuf response always decodes to a (possibly empty) list.
        let response: ListNodesResponse = self
            .unary(method::LIST_NODES, path!("ListNodes"), request)
            .await?;
        Ok(Some(response.nodes))
    }
}
