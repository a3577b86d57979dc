//! User accounts.

use std::sync::Arc;

use async_trait::async_trait;
use hsconverge_core::{ResourceKind, UserId, ValidationError};
use hsconverge_rpc::proto::{
    self, CreateUserRequest, DeleteUserRequest, ListUsersRequest, RenameUserRequest,
};
use hsconverge_rpc::{method, HeadscaleClient};
use hsconverge_store::{ResourceState, UserState};
use tracing::debug;

use crate::context::OpContext;
use crate::error::{ReconcileError, Result};
use crate::plan::{self, Plan};
use crate::reconciler::Reconciler;
use crate::types::{GoneReason, Observation, UserSpec};

/// Converges user accounts.
#[derive(Debug)]
pub struct UserReconciler<C> {
    client: Arc<C>,
}

impl<C: HeadscaleClient> UserReconciler<C> {
    /// Create a reconciler over `client`.
    pub const fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn user_state(user: proto::User) -> UserState {
    UserState {
        id: UserId::new(user.id),
        name: user.name,
        email: non_empty(user.email),
        display_name: non_empty(user.display_name),
        created_at: user.created_at.as_ref().and_then(proto::from_timestamp),
    }
}

#[async_trait]
impl<C: HeadscaleClient> Reconciler for UserReconciler<C> {
    type Desired = UserSpec;
    type State = UserState;

    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    fn validate(&self, _desired: &UserSpec) -> Result<()> {
        Ok(())
    }

    fn plan(&self, prior: &UserState, desired: &UserSpec) -> Plan {
        plan::user(prior, desired)
    }

    fn import(&self, id: &str) -> Result<UserState> {
        let id: UserId = id.parse().map_err(|source| ValidationError::InvalidImportId {
            kind: ResourceKind::User,
            source,
        })?;
        Ok(UserState {
            id,
            name: String::new(),
            email: None,
            display_name: None,
            created_at: None,
        })
    }

    fn to_resource(&self, state: UserState) -> ResourceState {
        ResourceState::User(state)
    }

    fn from_resource(&self, state: ResourceState) -> Option<UserState> {
        match state {
            ResourceState::User(user) => Some(user),
            _ => None,
        }
    }

    async fn create(&self, ctx: &OpContext, desired: &UserSpec) -> Result<UserState> {
        let request = CreateUserRequest {
            name: desired.name.clone(),
            display_name: desired.display_name.clone().unwrap_or_default(),
            email: desired.email.clone().unwrap_or_default(),
        };
        let response = ctx
            .call(method::CREATE_USER, self.client.create_user(request))
            .await?;
        let user = response.user.ok_or(ReconcileError::NullResponse {
            operation: method::CREATE_USER,
            what: "user",
        })?;
        debug!(user_id = user.id, name = %user.name, "User created");
        Ok(user_state(user))
    }

    async fn read(&self, ctx: &OpContext, prior: &UserState) -> Result<Observation<UserState>> {
        let request = ListUsersRequest {
            id: prior.id.get(),
            ..ListUsersRequest::default()
        };
        let response = match ctx
            .call(method::LIST_USERS, self.client.list_users(request))
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_remote_not_found() => {
                return Ok(Observation::Gone(GoneReason::NotFound))
            }
            Err(err) => return Err(err),
        };

        // An id of zero is not a filter on the server, so match rows here.
        let mut users: Vec<_> = response
            .users
            .into_iter()
            .filter(|user| user.id == prior.id.get())
            .collect();
        let matches = users.len();
        match users.pop() {
            Some(user) if matches == 1 => Ok(Observation::Present(user_state(user))),
            _ => {
                debug!(user_id = %prior.id, matches, "User lookup did not match exactly once");
                Ok(Observation::Gone(GoneReason::NotFound))
            }
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &UserState,
        desired: &UserSpec,
    ) -> Result<UserState> {
        if let Plan::Replace { .. } = plan::user(prior, desired) {
            return Err(ReconcileError::ImmutableFieldViolation {
                kind: ResourceKind::User,
                reason: "email and display name are fixed at creation",
            });
        }
        if prior.name == desired.name {
            return Ok(prior.clone());
        }

        let request = RenameUserRequest {
            old_id: prior.id.get(),
            new_name: desired.name.clone(),
        };
        let response = ctx
            .call(method::RENAME_USER, self.client.rename_user(request))
            .await?;
        let user = response.user.ok_or(ReconcileError::NullResponse {
            operation: method::RENAME_USER,
            what: "user",
        })?;
        debug!(user_id = user.id, name = %user.name, "User renamed");
        Ok(user_state(user))
    }

    async fn delete(&self, ctx: &OpContext, prior: &UserState) -> Result<()> {
        let request = DeleteUserRequest { id: prior.id.get() };
        ctx.call(method::DELETE_USER, self.client.delete_user(request))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsconverge_core::ManualClock;
    use hsconverge_rpc::{FakeHeadscale, Status};

    fn setup() -> (Arc<FakeHeadscale>, UserReconciler<FakeHeadscale>) {
        let fake = Arc::new(FakeHeadscale::new(Arc::new(ManualClock::starting_now())));
        (Arc::clone(&fake), UserReconciler::new(fake))
    }

    fn spec(name: &str, email: Option<&str>) -> UserSpec {
        UserSpec {
            name: name.into(),
            email: email.map(Into::into),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn create_then_read() {
        let (_fake, users) = setup();
        let ctx = OpContext::new();

        let created = users
            .create(&ctx, &spec("alice", Some("alice@example.com")))
            .await
            .unwrap();
        assert_eq!(created.name, "alice");
        assert_eq!(created.email.as_deref(), Some("alice@example.com"));
        assert!(created.display_name.is_none());
        assert!(created.created_at.is_some());

        let read = users.read(&ctx, &created).await.unwrap();
        assert_eq!(read, Observation::Present(created));
    }

    #[tokio::test]
    async fn rename_goes_through_update() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        let created = users.create(&ctx, &spec("alice", None)).await.unwrap();

        let renamed = users
            .update(&ctx, &created, &spec("alicia", None))
            .await
            .unwrap();
        assert_eq!(renamed.id, created.id);
        assert_eq!(renamed.name, "alicia");
        assert_eq!(fake.user(created.id.get()).unwrap().name, "alicia");
    }

    #[tokio::test]
    async fn email_change_is_rejected_in_place() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        let created = users.create(&ctx, &spec("alice", None)).await.unwrap();

        let err = users
            .update(&ctx, &created, &spec("alice", Some("new@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ImmutableFieldViolation {
                kind: ResourceKind::User,
                ..
            }
        ));
        assert_eq!(fake.calls(method::RENAME_USER), 0);
    }

    #[tokio::test]
    async fn removed_user_reads_as_gone() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        let created = users.create(&ctx, &spec("alice", None)).await.unwrap();

        fake.remove_user(created.id.get());
        assert_eq!(
            users.read(&ctx, &created).await.unwrap(),
            Observation::Gone(GoneReason::NotFound)
        );
    }

    #[tokio::test]
    async fn unfiltered_rows_do_not_count_as_a_match() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        users.create(&ctx, &spec("alice", None)).await.unwrap();

        // The service treats id 0 as "no filter" and returns every user.
        let zero = users.import("0").unwrap();
        assert_eq!(
            users.read(&ctx, &zero).await.unwrap(),
            Observation::Gone(GoneReason::NotFound)
        );
        assert_eq!(fake.calls(method::LIST_USERS), 1);
    }

    #[tokio::test]
    async fn remote_not_found_status_reads_as_gone() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        let created = users.create(&ctx, &spec("alice", None)).await.unwrap();

        fake.fail_next(method::LIST_USERS, Status::not_found("no such user"));
        assert_eq!(
            users.read(&ctx, &created).await.unwrap(),
            Observation::Gone(GoneReason::NotFound)
        );
    }

    #[tokio::test]
    async fn other_read_failures_propagate() {
        let (fake, users) = setup();
        let ctx = OpContext::new();
        let created = users.create(&ctx, &spec("alice", None)).await.unwrap();

        fake.fail_next(method::LIST_USERS, Status::unavailable("down"));
        let err = users.read(&ctx, &created).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[test]
    fn import_parses_numeric_id() {
        let (_fake, users) = setup();
        assert_eq!(users.import("42").unwrap().id, UserId::new(42));
        assert!(users.import("forty-two").unwrap_err().is_validation());
    }
}
