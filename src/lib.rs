use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod accounts;
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod graphql;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod seed;

pub mod routes;
use routes::{catalog, graphql as graphql_routes, public};

// --- Public Re-exports ---

pub use auth::{Authenticator, Principal};
pub use authz::{AccessProfile, Authorizer, PolicyPreset};
pub use config::AppConfig;
pub use error::{AppError, StartupError};
pub use graphql::CatalogSchema;
pub use password::PasswordEncoder;
pub use repository::{RepositoryState, SqliteRepository, UserStoreState};

/// ApiDoc
///
/// OpenAPI document for the REST surface, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_planets, handlers::planets_by_type, handlers::get_planet, handlers::planet_names,
        handlers::planet_name_mass, handlers::create_planet, handlers::update_planet,
        handlers::delete_planet,
        handlers::list_moons, handlers::moons_by_planet_name, handlers::get_moon,
        handlers::count_moons, handlers::count_moons_by_planet, handlers::create_moon, handlers::update_moon,
        handlers::delete_moon
    ),
    components(
        schemas(
            models::Planet, models::PlanetInput, models::PlanetNameMass,
            models::Moon, models::MoonInput, models::Role, models::UserDto,
            error::ErrorBody,
        )
    ),
    modifiers(&BasicAuthScheme),
    tags(
        (name = "space-catalog", description = "Planet and moon catalog with role-based access")
    )
)]
struct ApiDoc;

/// Registers the `basic_auth` scheme referenced by the handlers' `security(...)`.
struct BasicAuthScheme;

impl Modify for BasicAuthScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)),
            );
        }
    }
}

/// AppState
///
/// Everything a request may need, wired explicitly at startup. Cloning is cheap: every
/// service is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Planet/Moon persistence.
    pub repo: RepositoryState,
    /// Identity store (users and password hashes).
    pub users: UserStoreState,
    pub authenticator: Authenticator,
    pub authorizer: Authorizer,
    /// Shared with user provisioning; the authenticator holds its own clone.
    pub passwords: PasswordEncoder,
    /// Whether planet creation rejects case-insensitive duplicate names.
    pub unique_planet_names: bool,
    pub schema: CatalogSchema,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        repo: RepositoryState,
        users: UserStoreState,
        passwords: PasswordEncoder,
        profile: AccessProfile,
        config: AppConfig,
    ) -> Result<Self, StartupError> {
        let authenticator = Authenticator::new(users.clone(), passwords.clone())?;
        Ok(Self {
            repo,
            users,
            authenticator,
            authorizer: Authorizer::new(profile.policy),
            passwords,
            unique_planet_names: profile.unique_planet_names,
            schema: graphql::build_schema(),
            config,
        })
    }

    /// from_config
    ///
    /// Startup wiring: connect, migrate, resolve the access profile, seed what the
    /// configuration asks for.
    pub async fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let store = SqliteRepository::connect(&config.db_url).await?;
        store.migrate().await?;

        let profile = config.access_profile()?;
        let passwords = config.password_encoder()?;
        tracing::info!(
            policy = %config.access_policy,
            policy_file = ?config.access_policy_file,
            grants = profile.policy.len(),
            unique_planet_names = profile.unique_planet_names,
            "access profile loaded"
        );

        if config.seed_users {
            seed::seed_default_users(&store, &passwords).await?;
        }
        if config.seed_demo_data {
            seed::seed_demo_catalog(&store).await?;
        }

        let store = Arc::new(store);
        Self::new(
            store.clone() as RepositoryState,
            store as UserStoreState,
            passwords,
            profile,
            config,
        )
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(app_state: &AppState) -> Authenticator {
        app_state.authenticator.clone()
    }
}

impl FromRef<AppState> for Authorizer {
    fn from_ref(app_state: &AppState) -> Authorizer {
        app_state.authorizer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the protected routers. Extracting `Principal` verifies the Basic credential
/// and rejects with 401 before any handler runs; the resolved principal is stored in the
/// request extensions so the handler's own `Principal` argument reuses it.
async fn auth_middleware(principal: Principal, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies scoped and global middleware, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected routers: authentication first, then the per-operation policy check
    //    inside each handler or resolver.
    let protected = Router::new()
        .nest("/api", catalog::catalog_routes())
        .merge(graphql_routes::graphql_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // Innermost: fills in `path` on error bodies.
                .layer(middleware::from_fn(error::attach_error_path)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by the generated `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
