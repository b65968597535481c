use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid password hashing parameters: {0}")]
    Params(String),
    #[error("password hashing failed")]
    Hash,
    #[error("stored password hash is malformed")]
    MalformedHash,
}

/// PasswordEncoder
///
/// Argon2id hashing and verification. A plain value: it is built once from the
/// configuration and handed to the authenticator, user provisioning and seeding.
/// Verification reads the cost parameters from the stored PHC string, so hashes
/// produced under different settings keep verifying.
#[derive(Debug, Clone, Default)]
pub struct PasswordEncoder {
    params: Params,
}

impl PasswordEncoder {
    /// Builds an encoder with an explicit memory cost (KiB) and iteration count.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, raw: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| PasswordError::Hash)
    }

    pub fn verify(&self, raw: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::MalformedHash)?;
        Ok(self
            .argon2()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok())
    }

    /// `hash` on the blocking pool, for use from request handlers.
    pub async fn hash_blocking(&self, raw: String) -> Result<String, PasswordError> {
        let encoder = self.clone();
        tokio::task::spawn_blocking(move || encoder.hash(&raw))
            .await
            .map_err(|_| PasswordError::Hash)?
    }

    /// `verify` on the blocking pool, for use from request handlers.
    pub async fn verify_blocking(&self, raw: String, hash: String) -> Result<bool, PasswordError> {
        let encoder = self.clone();
        tokio::task::spawn_blocking(move || encoder.verify(&raw, &hash))
            .await
            .map_err(|_| PasswordError::Hash)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordEncoder {
        PasswordEncoder::with_cost(Params::MIN_M_COST, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify_success() {
        let encoder = cheap();
        let hash = encoder.hash("student123").expect("Hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(encoder.verify("student123", &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let encoder = cheap();
        let hash = encoder.hash("student123").unwrap();
        assert!(!encoder.verify("student124", &hash).unwrap());
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let encoder = cheap();
        assert_ne!(encoder.hash("admin123").unwrap(), encoder.hash("admin123").unwrap());
    }

    #[test]
    fn test_verify_malformed_hash() {
        assert!(matches!(
            cheap().verify("password", "not-a-phc-string"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn test_hash_from_other_cost_still_verifies() {
        let stronger = PasswordEncoder::with_cost(64, 2).unwrap();
        let hash = stronger.hash("staff123").unwrap();
        assert!(cheap().verify("staff123", &hash).unwrap());
    }

    #[test]
    fn test_rejects_memory_cost_below_minimum() {
        assert!(matches!(
            PasswordEncoder::with_cost(1, 1),
            Err(PasswordError::Params(_))
        ));
    }
}
