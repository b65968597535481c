/// Router Module Index
///
/// Routes are split by who may reach them. Everything outside `public` sits behind the
/// authentication layer applied in `create_router`; the per-operation role checks happen
/// inside the handlers and resolvers.

/// Liveness probe. No credential required.
pub mod public;

/// REST catalog under `/api`. Requires HTTP Basic.
pub mod catalog;

/// `POST /graphql`. Requires HTTP Basic.
pub mod graphql;
