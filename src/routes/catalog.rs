use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Catalog Router Module
///
/// The Planet/Moon REST surface. Every handler receives the authenticated `Principal`
/// and asks the authorizer for its one operation before touching the repository.
/// Static segments (`names`, `count`, ...) are registered next to `{id}`; axum prefers
/// the static match.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // --- Planets ---
        // GET /api/planets?type=...  |  POST /api/planets
        .route(
            "/planets",
            get(handlers::list_planets).post(handlers::create_planet),
        )
        // GET /api/planets/names
        .route("/planets/names", get(handlers::planet_names))
        // GET /api/planets/search/by-type?type=...
        .route("/planets/search/by-type", get(handlers::planets_by_type))
        // GET /api/planets/fields/name-mass
        .route("/planets/fields/name-mass", get(handlers::planet_name_mass))
        // GET | PUT | DELETE /api/planets/{id}
        // DELETE cascades to the planet's moons.
        .route(
            "/planets/{id}",
            get(handlers::get_planet)
                .put(handlers::update_planet)
                .delete(handlers::delete_planet),
        )
        // --- Moons ---
        // GET /api/moons?planetName=...  |  POST /api/moons
        .route(
            "/moons",
            get(handlers::list_moons).post(handlers::create_moon),
        )
        // GET /api/moons/count?planetId=...
        .route("/moons/count", get(handlers::count_moons))
        // GET /api/moons/count/by-planet/{planetId}
        .route(
            "/moons/count/by-planet/{planet_id}",
            get(handlers::count_moons_by_planet),
        )
        // GET /api/moons/by-planet-name/{planetName}
        .route(
            "/moons/by-planet-name/{planet_name}",
            get(handlers::moons_by_planet_name),
        )
        // GET | PUT | DELETE /api/moons/{id}
        .route(
            "/moons/{id}",
            get(handlers::get_moon)
                .put(handlers::update_moon)
                .delete(handlers::delete_moon),
        )
}
