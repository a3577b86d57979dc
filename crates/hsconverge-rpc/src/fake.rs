//! An in-memory coordination service for tests.
//!
//! `FakeHeadscale` keeps users, keys and nodes in memory and follows the
//! service's observable behavior closely enough to drive the reconcilers:
//! ids are assigned sequentially, secrets are random, expiring a pre-auth key
//! sets its expiration to "now", and nodes are only ever added by the test.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hsconverge_core::Clock;
use parking_lot::Mutex;
use tonic::Status;

use crate::client::{method, HeadscaleClient};
use crate::proto::{
    self, ApiKey, CreateApiKeyRequest, CreateApiKeyResponse, CreatePreAuthKeyRequest,
    CreatePreAuthKeyResponse, CreateUserRequest, CreateUserResponse, DeleteApiKeyRequest,
    DeleteApiKeyResponse, DeleteUserRequest, DeleteUserResponse, ExpirePreAuthKeyRequest,
    ExpirePreAuthKeyResponse, GetNodeRequest, GetNodeResponse, ListApiKeysRequest,
    ListApiKeysResponse, ListNodesRequest, ListPreAuthKeysRequest, ListPreAuthKeysResponse,
    ListUsersRequest, ListUsersResponse, Node, PreAuthKey, RenameUserRequest, RenameUserResponse,
    SetApprovedRoutesRequest, SetApprovedRoutesResponse, SetTagsRequest, SetTagsResponse, User,
};

#[derive(Default)]
struct FakeState {
    next_id: u64,
    users: BTreeMap<u64, User>,
    pre_auth_keys: BTreeMap<u64, (u64, PreAuthKey)>,
    api_keys: BTreeMap<String, ApiKey>,
    nodes: BTreeMap<u64, Node>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Behavior switches for failure injection.
#[derive(Default)]
struct Faults {
    fail_next: HashMap<&'static str, Status>,
    null_node_list: bool,
    omit_node_in_set: bool,
    delay: Option<Duration>,
}

/// In-memory implementation of [`HeadscaleClient`].
pub struct FakeHeadscale {
    clock: Arc<dyn Clock>,
    state: Mutex<FakeState>,
    faults: Mutex<Faults>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl std::fmt::Debug for FakeHeadscale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHeadscale")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl FakeHeadscale {
    /// Create an empty service reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(FakeState::default()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(BTreeMap::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------------

    /// Register a node owned by `user_id`, as if it had joined the network.
    pub fn add_node(&self, name: &str, user_id: Option<u64>) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        let user = user_id.and_then(|uid| state.users.get(&uid).cloned());
        state.nodes.insert(
            id,
            Node {
                id,
                name: name.to_string(),
                given_name: name.to_string(),
                user,
                created_at: Some(proto::to_timestamp(self.clock.now())),
                ..Node::default()
            },
        );
        id
    }

    /// Remove a node, as if it had been deleted out of band.
    pub fn remove_node(&self, node_id: u64) {
        self.state.lock().nodes.remove(&node_id);
    }

    /// Remove a user out of band.
    pub fn remove_user(&self, user_id: u64) {
        self.state.lock().users.remove(&user_id);
    }

    /// A copy of a node.
    #[must_use]
    pub fn node(&self, node_id: u64) -> Option<Node> {
        self.state.lock().nodes.get(&node_id).cloned()
    }

    /// A copy of a user.
    #[must_use]
    pub fn user(&self, user_id: u64) -> Option<User> {
        self.state.lock().users.get(&user_id).cloned()
    }

    /// A copy of a pre-auth key.
    #[must_use]
    pub fn pre_auth_key(&self, key_id: u64) -> Option<PreAuthKey> {
        self.state
            .lock()
            .pre_auth_keys
            .get(&key_id)
            .map(|(_, key)| key.clone())
    }

    /// A copy of an API key.
    #[must_use]
    pub fn api_key(&self, prefix: &str) -> Option<ApiKey> {
        self.state.lock().api_keys.get(prefix).cloned()
    }

    /// Number of calls made to one method.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Number of calls made to any method.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    // ------------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------------

    /// Fail the next call to `method` with `status`.
    pub fn fail_next(&self, method: &'static str, status: Status) {
        self.faults.lock().fail_next.insert(method, status);
    }

    /// Make `ListNodes` answer without a node list.
    pub fn set_null_node_list(&self, null: bool) {
        self.faults.lock().null_node_list = null;
    }

    /// Make `SetTags` and `SetApprovedRoutes` answer without the node.
    pub fn set_omit_node_in_set(&self, omit: bool) {
        self.faults.lock().omit_node_in_set = omit;
    }

    /// Delay every call by `delay` before it is served.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.lock().delay = delay;
    }

    async fn enter(&self, method: &'static str) -> Result<(), Status> {
        *self.calls.lock().entry(method).or_insert(0) += 1;

        let (delay, failure) = {
            let mut faults = self.faults.lock();
            (faults.delay, faults.fail_next.remove(method))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }

    fn now(&self) -> prost_types::Timestamp {
        proto::to_timestamp(self.clock.now())
    }
}

fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl HeadscaleClient for FakeHeadscale {
    async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<CreateUserResponse, Status> {
        self.enter(method::CREATE_USER).await?;
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.name == request.name) {
            return Err(Status::already_exists(format!(
                "user {:?} already exists",
                request.name
            )));
        }
        let id = state.next_id();
        let user = User {
            id,
            name: request.name,
            created_at: Some(self.now()),
            display_name: request.display_name,
            email: request.email,
        };
        state.users.insert(id, user.clone());
        Ok(CreateUserResponse { user: Some(user) })
    }

    async fn list_users(&self, request: ListUsersRequest) -> Result<ListUsersResponse, Status> {
        self.enter(method::LIST_USERS).await?;
        let state = self.state.lock();
        let users = state
            .users
            .values()
            .filter(|u| request.id == 0 || u.id == request.id)
            .filter(|u| request.name.is_empty() || u.name == request.name)
            .filter(|u| request.email.is_empty() || u.email == request.email)
            .cloned()
            .collect();
        Ok(ListUsersResponse { users })
    }

    async fn rename_user(
        &self,
        request: RenameUserRequest,
    ) -> Result<RenameUserResponse, Status> {
        self.enter(method::RENAME_USER).await?;
        let mut state = self.state.lock();
        if state
            .users
            .values()
            .any(|u| u.name == request.new_name && u.id != request.old_id)
        {
            return Err(Status::already_exists(format!(
                "user {:?} already exists",
                request.new_name
            )));
        }
        let user = state
            .users
            .get_mut(&request.old_id)
            .ok_or_else(|| Status::not_found("user not found"))?;
        user.name = request.new_name;
        Ok(RenameUserResponse {
            user: Some(user.clone()),
        })
    }

    async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, Status> {
        self.enter(method::DELETE_USER).await?;
        let mut state = self.state.lock();
        state
            .users
            .remove(&request.id)
            .ok_or_else(|| Status::not_found("user not found"))?;
        state.pre_auth_keys.retain(|_, (owner, _)| *owner != request.id);
        Ok(DeleteUserResponse {})
    }

    async fn create_pre_auth_key(
        &self,
        request: CreatePreAuthKeyRequest,
    ) -> Result<CreatePreAuthKeyResponse, Status> {
        self.enter(method::CREATE_PRE_AUTH_KEY).await?;
        let now = self.now();
        let mut state = self.state.lock();
        let user = state
            .users
            .get(&request.user)
            .cloned()
            .ok_or_else(|| Status::not_found("user not found"))?;
        let id = state.next_id();
        let key = PreAuthKey {
            user: Some(user),
            id,
            key: random_token(),
            reusable: request.reusable,
            ephemeral: request.ephemeral,
            used: false,
            expiration: request.expiration,
            created_at: Some(now),
            acl_tags: request.acl_tags,
        };
        state.pre_auth_keys.insert(id, (request.user, key.clone()));
        Ok(CreatePreAuthKeyResponse {
            pre_auth_key: Some(key),
        })
    }

    async fn list_pre_auth_keys(
        &self,
        request: ListPreAuthKeysRequest,
    ) -> Result<ListPreAuthKeysResponse, Status> {
        self.enter(method::LIST_PRE_AUTH_KEYS).await?;
        let state = self.state.lock();
        let pre_auth_keys = state
            .pre_auth_keys
            .values()
            .filter(|(owner, _)| *owner == request.user)
            .map(|(_, key)| key.clone())
            .collect();
        Ok(ListPreAuthKeysResponse { pre_auth_keys })
    }

    async fn expire_pre_auth_key(
        &self,
        request: ExpirePreAuthKeyRequest,
    ) -> Result<ExpirePreAuthKeyResponse, Status> {
        self.enter(method::EXPIRE_PRE_AUTH_KEY).await?;
        let now = self.now();
        let mut state = self.state.lock();
        let (_, key) = state
            .pre_auth_keys
            .values_mut()
            .find(|(owner, key)| *owner == request.user && key.key == request.key)
            .ok_or_else(|| Status::not_found("pre-auth key not found"))?;
        key.expiration = Some(now);
        Ok(ExpirePreAuthKeyResponse {})
    }

    async fn create_api_key(
        &self,
        request: CreateApiKeyRequest,
    ) -> Result<CreateApiKeyResponse, Status> {
        self.enter(method::CREATE_API_KEY).await?;
        let now = self.now();
        let mut state = self.state.lock();
        let id = state.next_id();
        let prefix = random_token()[..10].to_string();
        let api_key = format!("{prefix}.{}", random_token());
        state.api_keys.insert(
            prefix.clone(),
            ApiKey {
                id,
                prefix,
                expiration: request.expiration,
                created_at: Some(now),
                last_seen: None,
            },
        );
        Ok(CreateApiKeyResponse { api_key })
    }

    async fn list_api_keys(
        &self,
        _request: ListApiKeysRequest,
    ) -> Result<ListApiKeysResponse, Status> {
        self.enter(method::LIST_API_KEYS).await?;
        let api_keys = self.state.lock().api_keys.values().cloned().collect();
        Ok(ListApiKeysResponse { api_keys })
    }

    async fn delete_api_key(
        &self,
        request: DeleteApiKeyRequest,
    ) -> Result<DeleteApiKeyResponse, Status> {
        self.enter(method::DELETE_API_KEY).await?;
        self.state
            .lock()
            .api_keys
            .remove(&request.prefix)
            .ok_or_else(|| Status::not_found("api key not found"))?;
        Ok(DeleteApiKeyResponse {})
    }

    async fn get_node(&self, request: GetNodeRequest) -> Result<GetNodeResponse, Status> {
        self.enter(method::GET_NODE).await?;
        let node = self
            .state
            .lock()
            .nodes
            .get(&request.node_id)
            .cloned()
            .ok_or_else(|| Status::not_found("node not found"))?;
        Ok(GetNodeResponse { node: Some(node) })
    }

    async fn set_tags(&self, request: SetTagsRequest) -> Result<SetTagsResponse, Status> {
        self.enter(method::SET_TAGS).await?;
        let omit = self.faults.lock().omit_node_in_set;
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&request.node_id)
            .ok_or_else(|| Status::not_found("node not found"))?;
        node.forced_tags = request.tags;
        Ok(SetTagsResponse {
            node: (!omit).then(|| node.clone()),
        })
    }

    async fn set_approved_routes(
        &self,
        request: SetApprovedRoutesRequest,
    ) -> Result<SetApprovedRoutesResponse, Status> {
        self.enter(method::SET_APPROVED_ROUTES).await?;
        let omit = self.faults.lock().omit_node_in_set;
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&request.node_id)
            .ok_or_else(|| Status::not_found("node not found"))?;
        node.approved_routes = request.routes;
        Ok(SetApprovedRoutesResponse {
            node: (!omit).then(|| node.clone()),
        })
    }

    async fn list_nodes(&self, request: ListNodesRequest) -> Result<Option<Vec<Node>>, Status> {
        self.enter(method::LIST_NODES).await?;
        if self.faults.lock().null_node_list {
            return Ok(None);
        }
        let nodes = self
            .state
            .lock()
            .nodes
            .values()
            .filter(|node| {
                request.user.is_empty()
                    || node.user.as_ref().is_some_and(|u| u.name == request.user)
            })
            .cloned()
            .collect();
        Ok(Some(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsconverge_core::ManualClock;

    fn fake() -> (FakeHeadscale, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (FakeHeadscale::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn users_get_sequential_ids_and_unique_names() {
        let (hs, _clock) = fake();
        let alice = hs
            .create_user(CreateUserRequest {
                name: "alice".into(),
                ..CreateUserRequest::default()
            })
            .await
            .unwrap()
            .user
            .unwrap();
        assert_eq!(alice.id, 1);

        let err = hs
            .create_user(CreateUserRequest {
                name: "alice".into(),
                ..CreateUserRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
        assert_eq!(hs.calls(method::CREATE_USER), 2);
    }

    #[tokio::test]
    async fn expiring_a_key_sets_expiration_to_now() {
        let (hs, clock) = fake();
        let user = hs
            .create_user(CreateUserRequest {
                name: "bob".into(),
                ..CreateUserRequest::default()
            })
            .await
            .unwrap()
            .user
            .unwrap();
        let key = hs
            .create_pre_auth_key(CreatePreAuthKeyRequest {
                user: user.id,
                expiration: Some(proto::to_timestamp(clock.now() + chrono::Duration::hours(1))),
                ..CreatePreAuthKeyRequest::default()
            })
            .await
            .unwrap()
            .pre_auth_key
            .unwrap();

        hs.expire_pre_auth_key(ExpirePreAuthKeyRequest {
            user: user.id,
            key: key.key.clone(),
        })
        .await
        .unwrap();

        let stored = hs.pre_auth_key(key.id).unwrap();
        assert_eq!(
            stored.expiration.as_ref().and_then(proto::from_timestamp),
            Some(clock.now())
        );
    }

    #[tokio::test]
    async fn api_keys_are_prefix_dot_secret() {
        let (hs, _clock) = fake();
        let created = hs
            .create_api_key(CreateApiKeyRequest::default())
            .await
            .unwrap();
        let (prefix, secret) = created.api_key.split_once('.').unwrap();
        assert_eq!(prefix.len(), 10);
        assert!(!secret.is_empty());
        assert!(hs.api_key(prefix).is_some());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let (hs, _clock) = fake();
        hs.fail_next(method::LIST_API_KEYS, Status::unavailable("down"));

        let err = hs
            .list_api_keys(ListApiKeysRequest {})
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
        assert!(hs.list_api_keys(ListApiKeysRequest {}).await.is_ok());
    }

    #[tokio::test]
    async fn node_sets_replace_wholesale() {
        let (hs, _clock) = fake();
        let node_id = hs.add_node("gw", None);

        hs.set_approved_routes(SetApprovedRoutesRequest {
            node_id,
            routes: vec!["10.0.0.0/8".into()],
        })
        .await
        .unwrap();
        let node = hs
            .set_approved_routes(SetApprovedRoutesRequest {
                node_id,
                routes: vec!["192.168.0.0/24".into()],
            })
            .await
            .unwrap()
            .node
            .unwrap();
        assert_eq!(node.approved_routes, vec!["192.168.0.0/24".to_string()]);

        hs.remove_node(node_id);
        let err = hs.get_node(GetNodeRequest { node_id }).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn null_node_list_toggle() {
        let (hs, _clock) = fake();
        hs.add_node("a", None);
        assert_eq!(
            hs.list_nodes(ListNodesRequest::default())
                .await
                .unwrap()
                .map(|n| n.len()),
            Some(1)
        );

        hs.set_null_node_list(true);
        assert!(hs
            .list_nodes(ListNodesRequest::default())
            .await
            .unwrap()
            .is_none());
    }
}
