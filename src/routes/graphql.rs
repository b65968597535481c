use crate::{AppState, graphql};
use axum::{Router, routing::post};

/// GraphQL Router Module
///
/// A single endpoint. Role checks run per resolver, not per route.
pub fn graphql_routes() -> Router<AppState> {
    Router::new()
        // POST /graphql
        // userById (User AdminQuery), createUser (User AdminMutation).
        .route("/graphql", post(graphql::graphql_handler))
}
