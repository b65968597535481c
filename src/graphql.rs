//! GraphQL surface: `userById` and `createUser` on `POST /graphql`.
//!
//! Authentication happens before execution, in the HTTP layer, so an anonymous request
//! never reaches a resolver. Each resolver asks the same `Authorizer` the REST handlers
//! use; denials and domain failures come back as GraphQL errors carrying
//! `extensions.code`.

use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, ID, Object, ResultExt, Schema,
};
use axum::{Json, extract::State, extract::rejection::JsonRejection};

use crate::{
    AppState, accounts,
    auth::Principal,
    authz::{Action, Operation, ResourceKind},
    error::AppError,
    models::{CreateUserInput, UserDto},
};

const USER_QUERY: Operation = Operation::new(ResourceKind::User, Action::AdminQuery);
const USER_MUTATION: Operation = Operation::new(ResourceKind::User, Action::AdminMutation);

pub type CatalogSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema() -> CatalogSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription).finish()
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> Error {
        Error::new(self.to_string()).extend_with(|_, ext| ext.set("code", self.code()))
    }
}

/// The application state and the caller, both attached to the request by the handler.
fn request_scope<'a>(ctx: &Context<'a>) -> async_graphql::Result<(&'a AppState, &'a Principal)> {
    let state = ctx.data::<AppState>()?;
    let principal = ctx.data::<Principal>()?;
    Ok((state, principal))
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Looks a user up by id.
    async fn user_by_id(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<UserDto> {
        let (state, principal) = request_scope(ctx)?;
        state.authorizer.require(principal, USER_QUERY).extend()?;

        let id = id
            .parse::<i64>()
            .map_err(|_| AppError::ValidationFailed(format!("id must be an integer, got '{}'", id.as_str())))
            .extend()?;
        accounts::find_user(state.users.as_ref(), id).await.extend()
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Provisions a new user with the given role.
    async fn create_user(&self, ctx: &Context<'_>, input: CreateUserInput) -> async_graphql::Result<UserDto> {
        let (state, principal) = request_scope(ctx)?;
        state.authorizer.require(principal, USER_MUTATION).extend()?;

        tracing::debug!(user = %principal.username, new_user = %input.username, "createUser");
        accounts::provision_user(state.users.as_ref(), &state.passwords, input)
            .await
            .extend()
    }
}

/// graphql_handler
///
/// [Authenticated Route] Executes one GraphQL request on behalf of the authenticated
/// principal. A body that is not a GraphQL request object is a 400.
pub async fn graphql_handler(
    principal: Principal,
    State(state): State<AppState>,
    request: Result<Json<async_graphql::Request>, JsonRejection>,
) -> Result<Json<async_graphql::Response>, AppError> {
    let Json(request) = request.map_err(|rejection| AppError::ValidationFailed(rejection.body_text()))?;

    let schema = state.schema.clone();
    let response = schema
        .execute(request.data(principal).data(state))
        .await;
    Ok(Json(response))
}
