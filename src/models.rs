use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::AppError;

// --- Identity Schemas ---

/// Role
///
/// The RBAC dimension of a user. Roles are not ranked; what each role may do is
/// decided by the policy table in `authz`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TS,
    ToSchema,
    sqlx::Type,
    async_graphql::Enum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Role {
    Admin,
    Staff,
    #[default]
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Staff, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
            Role::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "STAFF" => Ok(Role::Staff),
            "STUDENT" => Ok(Role::Student),
            other => Err(AppError::ValidationFailed(format!("unknown role: {other}"))),
        }
    }
}

/// UserRecord
///
/// A row of the `app_user` table. The password is only ever held as an Argon2 PHC string.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// UserDto
///
/// Public view of a user, returned by the GraphQL `userById` query and `createUser` mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, async_graphql::SimpleObject)]
#[ts(export)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<UserRecord> for UserDto {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            role: record.role,
        }
    }
}

/// CreateUserInput
///
/// Input of the `createUser` mutation. `Debug` never prints the password.
#[derive(Clone, Deserialize, async_graphql::InputObject)]
pub struct CreateUserInput {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for CreateUserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserInput")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

// --- Catalog Schemas (Mapped to Database) ---

/// Planet
///
/// A row of the `planet` table and the JSON shape of every planet response.
/// The SQL column and the JSON key are both `type`, a reserved word in Rust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Planet {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub planet_type: String,
    pub radius_km: f64,
    pub mass_kg: f64,
    pub orbital_period_days: f64,
}

/// Moon
///
/// A moon joined with the name of the planet it orbits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Moon {
    pub id: i64,
    pub name: String,
    pub diameter_km: f64,
    pub orbital_period_days: f64,
    pub planet_id: i64,
    pub planet_name: String,
}

/// PlanetNameMass
///
/// Projection served by `GET /api/planets/fields/name-mass`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlanetNameMass {
    pub name: String,
    pub mass_kg: f64,
}

// --- Request Payloads (Input Schemas) ---

/// PlanetInput
///
/// Body of `POST /api/planets` and `PUT /api/planets/{id}`. Updates replace every field.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlanetInput {
    #[schema(example = "Mars")]
    pub name: String,
    #[serde(rename = "type")]
    #[schema(example = "Terrestrial")]
    pub planet_type: String,
    pub radius_km: f64,
    pub mass_kg: f64,
    pub orbital_period_days: f64,
}

/// MoonInput
///
/// Body of `POST /api/moons` and `PUT /api/moons/{id}`. `planetId` must name an existing planet.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MoonInput {
    #[schema(example = "Phobos")]
    pub name: String,
    pub diameter_km: f64,
    pub orbital_period_days: f64,
    pub planet_id: i64,
}

// --- Validation ---

/// Field-level checks run on every inbound payload before it reaches the repository.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Collects every violated constraint so a client sees all problems at once.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min || len > max {
            self.0
                .push(format!("{field} size must be between {min} and {max}"));
        }
    }

    fn positive(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value <= 0.0 {
            self.0.push(format!("{field} must be greater than 0"));
        }
    }

    fn positive_id(&mut self, field: &str, value: i64) {
        if value <= 0 {
            self.0.push(format!("{field} must be greater than 0"));
        }
    }

    fn finish(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationFailed(self.0.join("; ")))
        }
    }
}

impl Validate for PlanetInput {
    fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        v.length("name", &self.name, 2, 100);
        v.length("type", &self.planet_type, 3, 50);
        v.positive("radiusKm", self.radius_km);
        v.positive("massKg", self.mass_kg);
        v.positive("orbitalPeriodDays", self.orbital_period_days);
        v.finish()
    }
}

impl Validate for MoonInput {
    fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        v.length("name", &self.name, 1, 100);
        v.positive("diameterKm", self.diameter_km);
        v.positive("orbitalPeriodDays", self.orbital_period_days);
        v.positive_id("planetId", self.planet_id);
        v.finish()
    }
}

impl Validate for CreateUserInput {
    fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        v.length("username", &self.username, 3, 50);
        // Passwords are measured untrimmed; whitespace is significant.
        let password_len = self.password.chars().count();
        if !(6..=100).contains(&password_len) {
            v.0.push("password size must be between 6 and 100".to_string());
        }
        v.finish()
    }
}
