use crate::{
    AppState,
    auth::Principal,
    authz::{Action, Operation, ResourceKind},
    error::{AppError, ErrorBody},
    models::{Moon, MoonInput, Planet, PlanetInput, PlanetNameMass, Validate},
};
use axum::{
    Json,
    extract::{
        FromRequest, Path, Query, Request, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, de::DeserializeOwned};

const PLANET_READ: Operation = Operation::new(ResourceKind::Planet, Action::Read);
const PLANET_CREATE: Operation = Operation::new(ResourceKind::Planet, Action::Create);
const PLANET_UPDATE: Operation = Operation::new(ResourceKind::Planet, Action::Update);
const PLANET_DELETE: Operation = Operation::new(ResourceKind::Planet, Action::Delete);
const MOON_READ: Operation = Operation::new(ResourceKind::Moon, Action::Read);
const MOON_CREATE: Operation = Operation::new(ResourceKind::Moon, Action::Create);
const MOON_UPDATE: Operation = Operation::new(ResourceKind::Moon, Action::Update);
const MOON_DELETE: Operation = Operation::new(ResourceKind::Moon, Action::Delete);

// --- Extractors & Filters ---

/// ValidJson
///
/// `Json<T>` followed by `T::validate()`. Both malformed JSON and field violations are
/// reported as `ValidationFailed` with the standard error body.
///
/// Handlers take it as `Result<ValidJson<T>, AppError>` and unwrap it only after the
/// authorization check, so a forbidden caller gets 403 whatever the body contains.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::ValidationFailed(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::ValidationFailed(rejection.body_text()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::ValidationFailed(rejection.body_text()))
}

/// PlanetFilter
///
/// Query parameters of `GET /api/planets`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlanetFilter {
    /// Case-insensitive planet type, e.g. `gas giant`. Empty means no filter.
    #[serde(rename = "type")]
    pub planet_type: Option<String>,
}

/// MoonFilter
///
/// Query parameters of `GET /api/moons`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase", parameter_in = Query)]
pub struct MoonFilter {
    /// Case-insensitive name of the planet the moons orbit. Empty means no filter.
    pub planet_name: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase", parameter_in = Query)]
pub struct MoonCountQuery {
    pub planet_id: i64,
}

/// PlanetTypeQuery
///
/// Query parameters of `GET /api/planets/search/by-type`, where the type is mandatory.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlanetTypeQuery {
    /// Case-insensitive planet type.
    #[serde(rename = "type")]
    pub planet_type: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// --- Public ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

// --- Planets ---

/// list_planets
///
/// [Authenticated Route] Lists every planet, optionally narrowed to one type.
#[utoipa::path(
    get,
    path = "/api/planets",
    params(PlanetFilter),
    responses(
        (status = 200, description = "Planets", body = [Planet]),
        (status = 401, description = "Missing or invalid credential", body = ErrorBody),
        (status = 403, description = "Role may not read planets", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn list_planets(
    principal: Principal,
    State(state): State<AppState>,
    filter: Result<Query<PlanetFilter>, QueryRejection>,
) -> Result<Json<Vec<Planet>>, AppError> {
    state.authorizer.require(&principal, PLANET_READ)?;
    let filter = query(filter)?;
    tracing::debug!(user = %principal.username, filter = ?filter.planet_type, "listing planets");

    let planets = state.repo.list_planets(non_empty(&filter.planet_type)).await?;
    Ok(Json(planets))
}

/// planets_by_type
///
/// [Authenticated Route] Search form of `GET /api/planets?type=`; `type` is required.
#[utoipa::path(
    get,
    path = "/api/planets/search/by-type",
    params(PlanetTypeQuery),
    responses(
        (status = 200, description = "Planets of the type", body = [Planet]),
        (status = 400, description = "Missing type", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn planets_by_type(
    principal: Principal,
    State(state): State<AppState>,
    params: Result<Query<PlanetTypeQuery>, QueryRejection>,
) -> Result<Json<Vec<Planet>>, AppError> {
    state.authorizer.require(&principal, PLANET_READ)?;
    let PlanetTypeQuery { planet_type } = query(params)?;
    Ok(Json(state.repo.list_planets(Some(planet_type.trim())).await?))
}

/// get_planet
///
/// [Authenticated Route] Fetches one planet by id.
#[utoipa::path(
    get,
    path = "/api/planets/{id}",
    params(("id" = i64, Path, description = "Planet id")),
    responses(
        (status = 200, description = "Planet", body = Planet),
        (status = 404, description = "No such planet", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn get_planet(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Planet>, AppError> {
    state.authorizer.require(&principal, PLANET_READ)?;
    let id = path_id(id)?;
    Ok(Json(state.repo.get_planet(id).await?))
}

/// planet_names
///
/// [Authenticated Route] Names of all planets, in id order.
#[utoipa::path(
    get,
    path = "/api/planets/names",
    responses((status = 200, description = "Planet names", body = [String])),
    security(("basic_auth" = []))
)]
pub async fn planet_names(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    state.authorizer.require(&principal, PLANET_READ)?;
    Ok(Json(state.repo.planet_names().await?))
}

/// planet_name_mass
///
/// [Authenticated Route] Name and mass of all planets.
#[utoipa::path(
    get,
    path = "/api/planets/fields/name-mass",
    responses((status = 200, description = "Name/mass projection", body = [PlanetNameMass])),
    security(("basic_auth" = []))
)]
pub async fn planet_name_mass(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<Vec<PlanetNameMass>>, AppError> {
    state.authorizer.require(&principal, PLANET_READ)?;
    Ok(Json(state.repo.planet_name_mass().await?))
}

/// create_planet
///
/// [Authenticated Route] Adds a planet. When the active access profile keeps planet
/// names unique, a case-insensitive duplicate is rejected with 400.
#[utoipa::path(
    post,
    path = "/api/planets",
    request_body = PlanetInput,
    responses(
        (status = 201, description = "Created", body = Planet),
        (status = 400, description = "Invalid payload or duplicate name", body = ErrorBody),
        (status = 403, description = "Role may not create planets", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn create_planet(
    principal: Principal,
    State(state): State<AppState>,
    payload: Result<ValidJson<PlanetInput>, AppError>,
) -> Result<(StatusCode, Json<Planet>), AppError> {
    state.authorizer.require(&principal, PLANET_CREATE)?;
    let ValidJson(input) = payload?;

    let planet = state
        .repo
        .create_planet(input, state.unique_planet_names)
        .await?;
    tracing::info!(user = %principal.username, planet_id = planet.id, name = %planet.name, "planet created");
    Ok((StatusCode::CREATED, Json(planet)))
}

/// update_planet
///
/// [Authenticated Route] Replaces every field of a planet.
#[utoipa::path(
    put,
    path = "/api/planets/{id}",
    params(("id" = i64, Path, description = "Planet id")),
    request_body = PlanetInput,
    responses(
        (status = 200, description = "Updated", body = Planet),
        (status = 404, description = "No such planet", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn update_planet(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<ValidJson<PlanetInput>, AppError>,
) -> Result<Json<Planet>, AppError> {
    state.authorizer.require(&principal, PLANET_UPDATE)?;
    let id = path_id(id)?;
    let ValidJson(input) = payload?;

    let planet = state.repo.update_planet(id, input).await?;
    tracing::info!(user = %principal.username, planet_id = id, "planet updated");
    Ok(Json(planet))
}

/// delete_planet
///
/// [Authenticated Route] Deletes a planet together with all of its moons. Only the
/// planet delete is authorized; the moons go with it without a separate check.
#[utoipa::path(
    delete,
    path = "/api/planets/{id}",
    params(("id" = i64, Path, description = "Planet id")),
    responses(
        (status = 204, description = "Deleted, moons included"),
        (status = 403, description = "Role may not delete planets", body = ErrorBody),
        (status = 404, description = "No such planet", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn delete_planet(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    state.authorizer.require(&principal, PLANET_DELETE)?;
    let id = path_id(id)?;

    let moons = state.repo.delete_planet(id).await?;
    tracing::info!(user = %principal.username, planet_id = id, moons, "planet deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Moons ---

/// list_moons
///
/// [Authenticated Route] Lists every moon, optionally only those of one planet (by name).
#[utoipa::path(
    get,
    path = "/api/moons",
    params(MoonFilter),
    responses((status = 200, description = "Moons", body = [Moon])),
    security(("basic_auth" = []))
)]
pub async fn list_moons(
    principal: Principal,
    State(state): State<AppState>,
    filter: Result<Query<MoonFilter>, QueryRejection>,
) -> Result<Json<Vec<Moon>>, AppError> {
    state.authorizer.require(&principal, MOON_READ)?;
    let filter = query(filter)?;
    tracing::debug!(user = %principal.username, filter = ?filter.planet_name, "listing moons");

    let moons = state.repo.list_moons(non_empty(&filter.planet_name)).await?;
    Ok(Json(moons))
}

/// moons_by_planet_name
///
/// [Authenticated Route] Path form of `GET /api/moons?planetName=`.
#[utoipa::path(
    get,
    path = "/api/moons/by-planet-name/{planetName}",
    params(("planetName" = String, Path, description = "Planet name, case-insensitive")),
    responses((status = 200, description = "Moons of the planet", body = [Moon])),
    security(("basic_auth" = []))
)]
pub async fn moons_by_planet_name(
    principal: Principal,
    State(state): State<AppState>,
    Path(planet_name): Path<String>,
) -> Result<Json<Vec<Moon>>, AppError> {
    state.authorizer.require(&principal, MOON_READ)?;
    Ok(Json(state.repo.list_moons(Some(planet_name.trim())).await?))
}

/// get_moon
///
/// [Authenticated Route] Fetches one moon by id.
#[utoipa::path(
    get,
    path = "/api/moons/{id}",
    params(("id" = i64, Path, description = "Moon id")),
    responses(
        (status = 200, description = "Moon", body = Moon),
        (status = 404, description = "No such moon", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn get_moon(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Moon>, AppError> {
    state.authorizer.require(&principal, MOON_READ)?;
    let id = path_id(id)?;
    Ok(Json(state.repo.get_moon(id).await?))
}

/// count_moons
///
/// [Authenticated Route] Number of moons orbiting `planetId`. An unknown planet is a
/// 404, not a zero.
#[utoipa::path(
    get,
    path = "/api/moons/count",
    params(MoonCountQuery),
    responses(
        (status = 200, description = "Moon count", body = i64),
        (status = 404, description = "No such planet", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn count_moons(
    principal: Principal,
    State(state): State<AppState>,
    params: Result<Query<MoonCountQuery>, QueryRejection>,
) -> Result<Json<i64>, AppError> {
    state.authorizer.require(&principal, MOON_READ)?;
    let MoonCountQuery { planet_id } = query(params)?;
    Ok(Json(state.repo.count_moons_by_planet(planet_id).await?))
}

/// count_moons_by_planet
///
/// [Authenticated Route] Path form of `GET /api/moons/count?planetId=`.
#[utoipa::path(
    get,
    path = "/api/moons/count/by-planet/{planetId}",
    params(("planetId" = i64, Path, description = "Planet id")),
    responses(
        (status = 200, description = "Moon count", body = i64),
        (status = 404, description = "No such planet", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn count_moons_by_planet(
    principal: Principal,
    State(state): State<AppState>,
    planet_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<i64>, AppError> {
    state.authorizer.require(&principal, MOON_READ)?;
    let planet_id = path_id(planet_id)?;
    Ok(Json(state.repo.count_moons_by_planet(planet_id).await?))
}

/// create_moon
///
/// [Authenticated Route] Adds a moon to an existing planet. The role check comes first;
/// passing it does not excuse a missing planet, which is still a 404.
#[utoipa::path(
    post,
    path = "/api/moons",
    request_body = MoonInput,
    responses(
        (status = 201, description = "Created", body = Moon),
        (status = 403, description = "Role may not create moons", body = ErrorBody),
        (status = 404, description = "Referenced planet not found", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn create_moon(
    principal: Principal,
    State(state): State<AppState>,
    payload: Result<ValidJson<MoonInput>, AppError>,
) -> Result<(StatusCode, Json<Moon>), AppError> {
    state.authorizer.require(&principal, MOON_CREATE)?;
    let ValidJson(input) = payload?;

    let moon = state.repo.create_moon(input).await?;
    tracing::info!(user = %principal.username, moon_id = moon.id, planet_id = moon.planet_id, "moon created");
    Ok((StatusCode::CREATED, Json(moon)))
}

/// update_moon
///
/// [Authenticated Route] Replaces every field of a moon, possibly moving it to another planet.
#[utoipa::path(
    put,
    path = "/api/moons/{id}",
    params(("id" = i64, Path, description = "Moon id")),
    request_body = MoonInput,
    responses(
        (status = 200, description = "Updated", body = Moon),
        (status = 404, description = "No such moon, or referenced planet not found", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn update_moon(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<ValidJson<MoonInput>, AppError>,
) -> Result<Json<Moon>, AppError> {
    state.authorizer.require(&principal, MOON_UPDATE)?;
    let id = path_id(id)?;
    let ValidJson(input) = payload?;

    let moon = state.repo.update_moon(id, input).await?;
    tracing::info!(user = %principal.username, moon_id = id, "moon updated");
    Ok(Json(moon))
}

/// delete_moon
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/api/moons/{id}",
    params(("id" = i64, Path, description = "Moon id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such moon", body = ErrorBody)
    ),
    security(("basic_auth" = []))
)]
pub async fn delete_moon(
    principal: Principal,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    state.authorizer.require(&principal, MOON_DELETE)?;
    let id = path_id(id)?;

    state.repo.delete_moon(id).await?;
    tracing::info!(user = %principal.username, moon_id = id, "moon deleted");
    Ok(StatusCode::NO_CONTENT)
}
