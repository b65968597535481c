use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    error::AppError,
    models::{Moon, MoonInput, Planet, PlanetInput, PlanetNameMass, Role, UserRecord},
};

/// UserStore Trait
///
/// The identity store: lookups for the authenticator and inserts for user provisioning.
/// Kept apart from the catalog `Repository` so authentication can be tested against a
/// store that holds nothing but users.
#[async_trait]
pub trait UserStore: Send + Sync {
    // Exact, case-sensitive match.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError>;
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, AppError>;
    // Fails with Conflict when the username is taken.
    async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserRecord, AppError>;
    async fn count_users(&self) -> Result<i64, AppError>;
}

pub type UserStoreState = Arc<dyn UserStore>;

/// Repository Trait
///
/// Persistence contract of the Planet/Moon aggregate. Handlers reach it only after the
/// authorizer has allowed the operation; the repository itself knows nothing about roles.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Planets ---
    // `planet_type` matches case-insensitively.
    async fn list_planets(&self, planet_type: Option<&str>) -> Result<Vec<Planet>, AppError>;
    async fn get_planet(&self, id: i64) -> Result<Planet, AppError>;
    async fn planet_names(&self) -> Result<Vec<String>, AppError>;
    async fn planet_name_mass(&self) -> Result<Vec<PlanetNameMass>, AppError>;
    async fn count_planets(&self) -> Result<i64, AppError>;

    /// With `unique_name`, a case-insensitive duplicate name fails with `Conflict`.
    async fn create_planet(&self, input: PlanetInput, unique_name: bool) -> Result<Planet, AppError>;
    async fn update_planet(&self, id: i64, input: PlanetInput) -> Result<Planet, AppError>;

    /// Deletes the planet and every moon orbiting it in one transaction.
    /// Returns how many moons went with it.
    async fn delete_planet(&self, id: i64) -> Result<u64, AppError>;

    // --- Moons ---
    // `planet_name` matches case-insensitively.
    async fn list_moons(&self, planet_name: Option<&str>) -> Result<Vec<Moon>, AppError>;
    async fn get_moon(&self, id: i64) -> Result<Moon, AppError>;
    // NotFound when the planet itself does not exist.
    async fn count_moons_by_planet(&self, planet_id: i64) -> Result<i64, AppError>;
    async fn create_moon(&self, input: MoonInput) -> Result<Moon, AppError>;
    async fn update_moon(&self, id: i64, input: MoonInput) -> Result<Moon, AppError>;
    async fn delete_moon(&self, id: i64) -> Result<(), AppError>;
}

pub type RepositoryState = Arc<dyn Repository>;

const PLANET_COLUMNS: &str = "SELECT id, name, type, radius_km, mass_kg, orbital_period_days FROM planet";

const MOON_COLUMNS: &str = r#"
    SELECT m.id, m.name, m.diameter_km, m.orbital_period_days, m.planet_id, p.name AS planet_name
    FROM moon m
    JOIN planet p ON p.id = m.planet_id
"#;

/// SqliteRepository
///
/// Implements both `UserStore` and `Repository` over one SQLite pool.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url` with foreign keys enforced. An in-memory database lives
    /// inside a single connection, so that pool is pinned to one connection that never
    /// expires.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for SqliteRepository {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, role FROM app_user WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, AppError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, role FROM app_user WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserRecord, AppError> {
        let result = sqlx::query_as::<_, UserRecord>(
            r#"INSERT INTO app_user (username, password_hash, role)
               VALUES (?, ?, ?)
               RETURNING id, username, password_hash, role"#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AppError::Conflict(
                format!("Username already exists: {username}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_users(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM app_user")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    /// list_planets
    ///
    /// Optional filter assembled with QueryBuilder so the value is always bound, never
    /// spliced into the SQL text.
    async fn list_planets(&self, planet_type: Option<&str>) -> Result<Vec<Planet>, AppError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(PLANET_COLUMNS);
        if let Some(t) = planet_type {
            builder.push(" WHERE type_folded = ");
            builder.push_bind(fold_case(t));
        }
        builder.push(" ORDER BY id");

        let planets = builder
            .build_query_as::<Planet>()
            .fetch_all(&self.pool)
            .await?;
        Ok(planets)
    }

    async fn get_planet(&self, id: i64) -> Result<Planet, AppError> {
        sqlx::query_as::<_, Planet>(&format!("{PLANET_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Planet", id))
    }

    async fn planet_names(&self) -> Result<Vec<String>, AppError> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM planet ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn planet_name_mass(&self) -> Result<Vec<PlanetNameMass>, AppError> {
        let rows = sqlx::query_as::<_, PlanetNameMass>("SELECT name, mass_kg FROM planet ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_planets(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM planet")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// create_planet
    ///
    /// The duplicate-name check and the insert share a transaction, so two concurrent
    /// creates of "Mars" and "MARS" cannot both pass the check. Names are compared on
    /// their Unicode lowercase, so "Ērde" and "ērde" collide as well.
    async fn create_planet(&self, input: PlanetInput, unique_name: bool) -> Result<Planet, AppError> {
        let mut tx = self.pool.begin().await?;

        if unique_name {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM planet WHERE name_folded = ?)",
            )
            .bind(fold_case(&input.name))
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(AppError::Conflict(format!(
                    "Planet with name already exists: {}",
                    input.name.trim()
                )));
            }
        }

        let planet = sqlx::query_as::<_, Planet>(
            r#"INSERT INTO planet (name, name_folded, type, type_folded, radius_km, mass_kg, orbital_period_days)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING id, name, type, radius_km, mass_kg, orbital_period_days"#,
        )
        .bind(input.name.trim())
        .bind(fold_case(&input.name))
        .bind(input.planet_type.trim())
        .bind(fold_case(&input.planet_type))
        .bind(input.radius_km)
        .bind(input.mass_kg)
        .bind(input.orbital_period_days)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(planet)
    }

    async fn update_planet(&self, id: i64, input: PlanetInput) -> Result<Planet, AppError> {
        sqlx::query_as::<_, Planet>(
            r#"UPDATE planet
               SET name = ?, name_folded = ?, type = ?, type_folded = ?,
                   radius_km = ?, mass_kg = ?, orbital_period_days = ?
               WHERE id = ?
               RETURNING id, name, type, radius_km, mass_kg, orbital_period_days"#,
        )
        .bind(input.name.trim())
        .bind(fold_case(&input.name))
        .bind(input.planet_type.trim())
        .bind(fold_case(&input.planet_type))
        .bind(input.radius_km)
        .bind(input.mass_kg)
        .bind(input.orbital_period_days)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Planet", id))
    }

    /// delete_planet
    ///
    /// Cascade as two statements in one transaction: moons first (the foreign key
    /// forbids the reverse order), then the planet. Callers authorize the planet delete
    /// only; the moon deletes ride on that decision.
    async fn delete_planet(&self, id: i64) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let moons = sqlx::query("DELETE FROM moon WHERE planet_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM planet WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            // Nothing was removed; dropping `tx` rolls back.
            return Err(AppError::not_found("Planet", id));
        }

        tx.commit().await?;
        tracing::info!(planet_id = id, moons_removed = moons, "planet deleted with its moons");
        Ok(moons)
    }

    async fn list_moons(&self, planet_name: Option<&str>) -> Result<Vec<Moon>, AppError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(MOON_COLUMNS);
        if let Some(name) = planet_name {
            builder.push(" WHERE p.name_folded = ");
            builder.push_bind(fold_case(name));
        }
        builder.push(" ORDER BY m.id");

        let moons = builder.build_query_as::<Moon>().fetch_all(&self.pool).await?;
        Ok(moons)
    }

    async fn get_moon(&self, id: i64) -> Result<Moon, AppError> {
        sqlx::query_as::<_, Moon>(&format!("{MOON_COLUMNS} WHERE m.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Moon", id))
    }

    async fn count_moons_by_planet(&self, planet_id: i64) -> Result<i64, AppError> {
        let (exists, count) = sqlx::query_as::<_, (bool, i64)>(
            r#"SELECT EXISTS(SELECT 1 FROM planet WHERE id = ?),
                      (SELECT COUNT(*) FROM moon WHERE planet_id = ?)"#,
        )
        .bind(planet_id)
        .bind(planet_id)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Err(AppError::not_found("Planet", planet_id));
        }
        Ok(count)
    }

    /// create_moon
    ///
    /// The parent lookup and the insert run in one transaction so the planet cannot
    /// vanish between them. A missing planet is a `ReferenceNotFound`, not a `NotFound`.
    async fn create_moon(&self, input: MoonInput) -> Result<Moon, AppError> {
        let mut tx = self.pool.begin().await?;
        require_planet(&mut tx, input.planet_id).await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO moon (name, diameter_km, orbital_period_days, planet_id)
               VALUES (?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(input.name.trim())
        .bind(input.diameter_km)
        .bind(input.orbital_period_days)
        .bind(input.planet_id)
        .fetch_one(&mut *tx)
        .await?;

        let moon = sqlx::query_as::<_, Moon>(&format!("{MOON_COLUMNS} WHERE m.id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(moon)
    }

    async fn update_moon(&self, id: i64, input: MoonInput) -> Result<Moon, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM moon WHERE id = ?)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::not_found("Moon", id));
        }
        require_planet(&mut tx, input.planet_id).await?;

        sqlx::query(
            r#"UPDATE moon
               SET name = ?, diameter_km = ?, orbital_period_days = ?, planet_id = ?
               WHERE id = ?"#,
        )
        .bind(input.name.trim())
        .bind(input.diameter_km)
        .bind(input.orbital_period_days)
        .bind(input.planet_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let moon = sqlx::query_as::<_, Moon>(&format!("{MOON_COLUMNS} WHERE m.id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(moon)
    }

    async fn delete_moon(&self, id: i64) -> Result<(), AppError> {
        let deleted = sqlx::query("DELETE FROM moon WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::not_found("Moon", id));
        }
        Ok(())
    }
}

// Case-insensitive comparison key for planet names and types.
fn fold_case(value: &str) -> String {
    value.trim().to_lowercase()
}

async fn require_planet(tx: &mut sqlx::Transaction<'_, Sqlite>, planet_id: i64) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM planet WHERE id = ?)")
        .bind(planet_id)
        .fetch_one(&mut **tx)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::reference_not_found("Planet", planet_id))
    }
}
