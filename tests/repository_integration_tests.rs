use space_catalog::{
    AppError,
    models::{MoonInput, PlanetInput, Role},
    repository::{Repository, SqliteRepository, UserStore},
};

// --- Test Context and Setup ---

/// A fresh, migrated in-memory database per test.
struct DbTestContext {
    repo: SqliteRepository,
}

impl DbTestContext {
    async fn setup() -> Self {
        let repo = SqliteRepository::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory SQLite.");
        repo.migrate().await.expect("Failed to run database migrations.");
        DbTestContext { repo }
    }

    fn repository(&self) -> &SqliteRepository {
        &self.repo
    }
}

// --- Test Data Helpers ---

fn planet(name: &str, planet_type: &str) -> PlanetInput {
    PlanetInput {
        name: name.to_string(),
        planet_type: planet_type.to_string(),
        radius_km: 3389.5,
        mass_kg: 6.39e23,
        orbital_period_days: 687.0,
    }
}

fn moon(name: &str, planet_id: i64) -> MoonInput {
    MoonInput {
        name: name.to_string(),
        diameter_km: 22.4,
        orbital_period_days: 0.32,
        planet_id,
    }
}

async fn moon_rows_for(repo: &SqliteRepository, planet_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM moon WHERE planet_id = ?")
        .bind(planet_id)
        .fetch_one(repo.pool())
        .await
        .unwrap()
}

// --- Planets ---

#[tokio::test]
async fn test_create_and_get_planet() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let created = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    assert!(created.id > 0);

    let fetched = repo.get_planet(created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.planet_type, "Terrestrial");
}

#[tokio::test]
async fn test_get_missing_planet_is_not_found() {
    let ctx = DbTestContext::setup().await;
    let err = ctx.repository().get_planet(404).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { resource: "Planet", .. }));
}

#[tokio::test]
async fn test_unique_names_reject_case_only_duplicates() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let err = repo
        .create_planet(planet("MARS", "Terrestrial"), true)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(repo.count_planets().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unique_names_fold_non_ascii_case() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    repo.create_planet(planet("Ērde", "Terrestrial"), true).await.unwrap();
    let err = repo
        .create_planet(planet("ērde", "Terrestrial"), true)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(repo.count_planets().await.unwrap(), 1);
}

#[tokio::test]
async fn test_filters_fold_non_ascii_case() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let ceres = repo.create_planet(planet("Çeres", "Zwergplanet Ä"), true).await.unwrap();
    repo.create_moon(moon("Ödin", ceres.id)).await.unwrap();

    let planets = repo.list_planets(Some("zwergplanet ä")).await.unwrap();
    assert_eq!(planets.len(), 1);
    assert_eq!(planets[0].name, "Çeres");

    let moons = repo.list_moons(Some("çeres")).await.unwrap();
    assert_eq!(moons.len(), 1);
    assert_eq!(moons[0].planet_name, "Çeres");
}

#[tokio::test]
async fn test_renamed_planet_is_found_by_new_name() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let created = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    repo.update_planet(created.id, planet("Ärës", "Terrestrial")).await.unwrap();
    repo.create_moon(moon("Phobos", created.id)).await.unwrap();

    assert_eq!(repo.list_moons(Some("ÄRËS")).await.unwrap().len(), 1);
    assert!(repo.list_moons(Some("mars")).await.unwrap().is_empty());
    assert!(matches!(
        repo.create_planet(planet("ärës", "Terrestrial"), true).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_duplicate_names_allowed_when_not_enforced() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    repo.create_planet(planet("Mars", "Terrestrial"), false).await.unwrap();
    repo.create_planet(planet("mars", "Terrestrial"), false).await.unwrap();
    assert_eq!(repo.count_planets().await.unwrap(), 2);
}

#[tokio::test]
async fn test_type_filter_is_case_insensitive() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    repo.create_planet(planet("Jupiter", "Gas Giant"), true).await.unwrap();
    repo.create_planet(planet("Saturn", "Gas Giant"), true).await.unwrap();
    repo.create_planet(planet("Venus", "Terrestrial"), true).await.unwrap();

    let giants = repo.list_planets(Some("GAS GIANT")).await.unwrap();
    let names: Vec<_> = giants.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Jupiter", "Saturn"]);

    assert_eq!(repo.list_planets(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_planet_replaces_fields() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let created = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();

    let mut input = planet("Red Planet", "Rocky");
    input.radius_km = 3390.0;
    let updated = repo.update_planet(created.id, input).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "Red Planet");
    assert_eq!(updated.planet_type, "Rocky");
    assert_eq!(updated.radius_km, 3390.0);

    let err = repo.update_planet(999, planet("Ghost", "None")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_projections_follow_insertion_order() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    repo.create_planet(planet("Mercury", "Terrestrial"), true).await.unwrap();
    repo.create_planet(planet("Venus", "Terrestrial"), true).await.unwrap();

    assert_eq!(repo.planet_names().await.unwrap(), ["Mercury", "Venus"]);
    let name_mass = repo.planet_name_mass().await.unwrap();
    assert_eq!(name_mass[1].name, "Venus");
    assert_eq!(name_mass[1].mass_kg, 6.39e23);
}

// --- Cascade delete ---

#[tokio::test]
async fn test_delete_planet_cascades_to_moons() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let earth = repo.create_planet(planet("Earth", "Terrestrial"), true).await.unwrap();
    repo.create_moon(moon("Phobos", mars.id)).await.unwrap();
    repo.create_moon(moon("Deimos", mars.id)).await.unwrap();
    repo.create_moon(moon("Moon", earth.id)).await.unwrap();

    let removed = repo.delete_planet(mars.id).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(moon_rows_for(repo, mars.id).await, 0);
    assert!(matches!(
        repo.get_planet(mars.id).await,
        Err(AppError::NotFound { .. })
    ));
    // Other planets keep their moons.
    assert_eq!(moon_rows_for(repo, earth.id).await, 1);
}

#[tokio::test]
async fn test_delete_missing_planet_is_not_found() {
    let ctx = DbTestContext::setup().await;
    let err = ctx.repository().delete_planet(12).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { resource: "Planet", .. }));
}

// --- Moons ---

#[tokio::test]
async fn test_create_moon_for_missing_planet_is_reference_not_found() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let err = repo.create_moon(moon("Orphan", 77)).await.unwrap_err();
    assert!(matches!(err, AppError::ReferenceNotFound { resource: "Planet", .. }));
    assert_eq!(err.status(), 404);
    assert!(repo.list_moons(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_moon_carries_planet_name() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();

    let phobos = repo.create_moon(moon("Phobos", mars.id)).await.unwrap();
    assert_eq!(phobos.planet_name, "Mars");
    assert_eq!(repo.get_moon(phobos.id).await.unwrap(), phobos);
}

#[tokio::test]
async fn test_list_moons_by_planet_name() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let earth = repo.create_planet(planet("Earth", "Terrestrial"), true).await.unwrap();
    repo.create_moon(moon("Phobos", mars.id)).await.unwrap();
    repo.create_moon(moon("Moon", earth.id)).await.unwrap();

    let moons = repo.list_moons(Some("mArS")).await.unwrap();
    assert_eq!(moons.len(), 1);
    assert_eq!(moons[0].name, "Phobos");
    assert!(repo.list_moons(Some("Pluto")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_count_moons_by_planet() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let venus = repo.create_planet(planet("Venus", "Terrestrial"), true).await.unwrap();
    repo.create_moon(moon("Phobos", mars.id)).await.unwrap();
    repo.create_moon(moon("Deimos", mars.id)).await.unwrap();

    assert_eq!(repo.count_moons_by_planet(mars.id).await.unwrap(), 2);
    assert_eq!(repo.count_moons_by_planet(venus.id).await.unwrap(), 0);
    assert!(matches!(
        repo.count_moons_by_planet(999).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_update_moon_checks_moon_then_planet() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let earth = repo.create_planet(planet("Earth", "Terrestrial"), true).await.unwrap();
    let luna = repo.create_moon(moon("Luna", mars.id)).await.unwrap();

    let moved = repo.update_moon(luna.id, moon("Moon", earth.id)).await.unwrap();
    assert_eq!(moved.planet_id, earth.id);
    assert_eq!(moved.planet_name, "Earth");

    let missing_moon = repo.update_moon(999, moon("X", earth.id)).await.unwrap_err();
    assert!(matches!(missing_moon, AppError::NotFound { resource: "Moon", .. }));

    let missing_planet = repo.update_moon(luna.id, moon("X", 999)).await.unwrap_err();
    assert!(matches!(missing_planet, AppError::ReferenceNotFound { .. }));
}

#[tokio::test]
async fn test_delete_moon() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let mars = repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
    let phobos = repo.create_moon(moon("Phobos", mars.id)).await.unwrap();

    repo.delete_moon(phobos.id).await.unwrap();
    assert!(matches!(repo.delete_moon(phobos.id).await, Err(AppError::NotFound { .. })));
    // The planet is untouched.
    assert!(repo.get_planet(mars.id).await.is_ok());
}

// --- Users ---

#[tokio::test]
async fn test_user_insert_and_lookup() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let user = repo.insert_user("curator", "$argon2id$fake", Role::Staff).await.unwrap();
    assert_eq!(user.role, Role::Staff);

    let by_name = repo.find_user_by_username("curator").await.unwrap().unwrap();
    assert_eq!(by_name.id, user.id);
    assert!(repo.find_user_by_username("Curator").await.unwrap().is_none());
    assert!(repo.find_user_by_id(user.id).await.unwrap().is_some());
    assert_eq!(repo.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    repo.insert_user("curator", "h1", Role::Staff).await.unwrap();
    let err = repo.insert_user("curator", "h2", Role::Admin).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_file_backed_database_persists_between_pools() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());

    {
        let repo = SqliteRepository::connect(&url).await.unwrap();
        repo.migrate().await.unwrap();
        repo.create_planet(planet("Mars", "Terrestrial"), true).await.unwrap();
        repo.pool().close().await;
    }

    let reopened = SqliteRepository::connect(&url).await.unwrap();
    reopened.migrate().await.unwrap();
    assert_eq!(reopened.planet_names().await.unwrap(), ["Mars"]);
}
