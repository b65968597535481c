use crate::{
    accounts::provision_user,
    error::AppError,
    models::{CreateUserInput, MoonInput, PlanetInput, Role},
    password::PasswordEncoder,
    repository::{Repository, UserStore},
};

const DEFAULT_USERS: [(&str, &str, Role); 3] = [
    ("admin", "admin123", Role::Admin),
    ("staff", "staff123", Role::Staff),
    ("student", "student123", Role::Student),
];

/// Creates one account per role when the user table is empty. Returns how many were created.
pub async fn seed_default_users(store: &dyn UserStore, passwords: &PasswordEncoder) -> Result<usize, AppError> {
    if store.count_users().await? > 0 {
        tracing::debug!("users present, skipping default accounts");
        return Ok(0);
    }

    for (username, password, role) in DEFAULT_USERS {
        let input = CreateUserInput {
            username: username.to_string(),
            password: password.to_string(),
            role,
        };
        provision_user(store, passwords, input).await?;
    }
    tracing::warn!("seeded default accounts admin, staff and student; change their passwords outside local use");
    Ok(DEFAULT_USERS.len())
}

/// Seeds Earth and Jupiter with their best-known moons when no planet exists yet.
pub async fn seed_demo_catalog(repo: &dyn Repository) -> Result<bool, AppError> {
    if repo.count_planets().await? > 0 {
        return Ok(false);
    }

    let earth = repo
        .create_planet(
            PlanetInput {
                name: "Earth".to_string(),
                planet_type: "Terrestrial".to_string(),
                radius_km: 6371.0,
                mass_kg: 5.972e24,
                orbital_period_days: 365.25,
            },
            false,
        )
        .await?;
    let jupiter = repo
        .create_planet(
            PlanetInput {
                name: "Jupiter".to_string(),
                planet_type: "Gas Giant".to_string(),
                radius_km: 69911.0,
                mass_kg: 1.898e27,
                orbital_period_days: 4333.0,
            },
            false,
        )
        .await?;

    let moons = [
        ("Moon", 3474.8, 27.3, earth.id),
        ("Io", 3642.0, 1.77, jupiter.id),
        ("Europa", 3121.6, 3.55, jupiter.id),
    ];
    for (name, diameter_km, orbital_period_days, planet_id) in moons {
        repo.create_moon(MoonInput {
            name: name.to_string(),
            diameter_km,
            orbital_period_days,
            planet_id,
        })
        .await?;
    }

    tracing::info!("seeded demo catalog (2 planets, 3 moons)");
    Ok(true)
}
