use std::env;
use std::path::PathBuf;

use crate::{
    authz::{AccessProfile, PolicyDocument, PolicyError, PolicyPreset},
    password::{PasswordEncoder, PasswordError},
};

/// AppConfig
///
/// Immutable configuration, loaded once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and seeding defaults.
    pub env: Env,
    // SQLite connection string, e.g. `sqlite://catalog.db` or `sqlite::memory:`.
    pub db_url: String,
    pub bind_addr: String,
    // Named access policy used unless a policy file is given.
    pub access_policy: PolicyPreset,
    pub access_policy_file: Option<PathBuf>,
    // Create admin/staff/student when the user table is empty.
    pub seed_users: bool,
    pub seed_demo_data: bool,
    // Argon2 memory cost in KiB, and iteration count.
    pub password_memory_kib: u32,
    pub password_iterations: u32,
}

/// Env
///
/// Runtime context: `Local` favors convenience (pretty logs, seeded data),
/// `Production` demands explicit settings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Test configuration: in-memory database, default accounts, the cheapest Argon2
    /// parameters the library accepts. Never panics.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            access_policy: PolicyPreset::Strict,
            access_policy_file: None,
            seed_users: true,
            seed_demo_data: false,
            password_memory_kib: 8,
            password_iterations: 1,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables.
    ///
    /// # Panics
    /// Panics if a variable required in production is missing, or if any variable is set
    /// to a value that cannot be parsed. The service never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => {
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")
            }
            Env::Local => env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string()),
        };

        let access_policy = env::var("ACCESS_POLICY")
            .map(|raw| {
                raw.parse::<PolicyPreset>()
                    .unwrap_or_else(|e| panic!("FATAL: ACCESS_POLICY: {e}"))
            })
            .unwrap_or_default();

        let local = env == Env::Local;
        Self {
            env,
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            access_policy,
            access_policy_file: env::var("ACCESS_POLICY_FILE").ok().map(PathBuf::from),
            seed_users: env_flag("SEED_USERS", local),
            seed_demo_data: env_flag("SEED_DEMO_DATA", local),
            password_memory_kib: env_number("PASSWORD_MEMORY_KIB", 19_456),
            password_iterations: env_number("PASSWORD_ITERATIONS", 2),
        }
    }

    /// The access profile in force: the policy file when one is configured, otherwise
    /// the named preset.
    pub fn access_profile(&self) -> Result<AccessProfile, PolicyError> {
        match &self.access_policy_file {
            Some(path) => Ok(PolicyDocument::load(path)?.into_profile()),
            None => Ok(self.access_policy.profile()),
        }
    }

    pub fn password_encoder(&self) -> Result<PasswordEncoder, PasswordError> {
        PasswordEncoder::with_cost(self.password_memory_kib, self.password_iterations)
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => panic!("FATAL: {key} must be a boolean, got '{other}'"),
        },
        Err(_) => default,
    }
}

fn env_number(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {key} must be a positive integer, got '{raw}'")),
        Err(_) => default,
    }
}
