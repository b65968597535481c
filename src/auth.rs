use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use thiserror::Error;

use crate::{
    error::AppError,
    models::Role,
    password::{PasswordEncoder, PasswordError},
    repository::UserStoreState,
};

/// Credential
///
/// A username/secret pair as presented by the client. Transient: it is never
/// persisted, and its `Debug` output hides the secret.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Parses an `Authorization` header value of the form `Basic base64(user:pass)`.
    /// The scheme is matched case-insensitively; the password may itself contain `:`.
    pub fn from_basic_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, secret) = decoded.split_once(':')?;
        if username.is_empty() {
            return None;
        }
        Some(Self::new(username, secret))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Principal
///
/// The authenticated identity attached to a request. The role always comes from
/// the identity store, never from anything the client sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password; the two are never told apart.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("authentication could not be completed: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Unauthenticated,
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Authenticator
///
/// Checks a credential against the identity store. Stateless: nothing is
/// remembered between requests.
#[derive(Clone)]
pub struct Authenticator {
    users: UserStoreState,
    passwords: PasswordEncoder,
    // Verified against when the username is unknown, so both failure paths cost one verify.
    // It carries the encoder's current cost. A stored hash verifies at the cost it was made
    // with, so after PASSWORD_MEMORY_KIB or PASSWORD_ITERATIONS change, users whose hashes
    // predate the change take a different time to reject than unknown usernames.
    decoy_hash: Arc<str>,
}

fn decoy_hash(passwords: &PasswordEncoder) -> Result<String, PasswordError> {
    passwords.hash("decoy-password-never-matches")
}

impl Authenticator {
    pub fn new(users: UserStoreState, passwords: PasswordEncoder) -> Result<Self, PasswordError> {
        let decoy_hash = decoy_hash(&passwords)?;
        Ok(Self {
            users,
            passwords,
            decoy_hash: Arc::from(decoy_hash),
        })
    }

    pub async fn authenticate(&self, credential: &Credential) -> Result<Principal, AuthError> {
        let record = self
            .users
            .find_user_by_username(&credential.username)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let stored_hash = match &record {
            Some(user) => user.password_hash.clone(),
            None => self.decoy_hash.to_string(),
        };

        let matches = self
            .passwords
            .verify_blocking(credential.secret().to_owned(), stored_hash)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        match record {
            Some(user) if matches => {
                tracing::debug!(user = %user.username, role = %user.role, "authenticated");
                Ok(Principal {
                    id: user.id,
                    username: user.username,
                    role: user.role,
                })
            }
            _ => {
                tracing::warn!(user = %credential.username, "authentication failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

/// Principal Extractor Implementation
///
/// Resolves the caller of a protected route:
/// 1. Reuse: if the authentication middleware already resolved a principal for this
///    request, it is taken from the request extensions (no second password check).
/// 2. Credential extraction: `Authorization: Basic ...`.
/// 3. Verification through the `Authenticator`.
///
/// Rejection: `AppError::Unauthenticated` (401 with `WWW-Authenticate`) for a missing,
/// malformed or wrong credential; `AppError::Internal` if the store fails.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let credential = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(Credential::from_basic_header)
            .ok_or(AppError::Unauthenticated)?;

        let authenticator = Authenticator::from_ref(state);
        let principal = authenticator.authenticate(&credential).await?;

        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn test_parses_basic_header() {
        let credential = Credential::from_basic_header(&basic("staff:staff123")).unwrap();
        assert_eq!(credential.username, "staff");
        assert_eq!(credential.secret(), "staff123");
    }

    #[test]
    fn test_password_may_contain_colon() {
        let credential = Credential::from_basic_header(&basic("admin:a:b:c")).unwrap();
        assert_eq!(credential.secret(), "a:b:c");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = format!("basic {}", STANDARD.encode("student:student123"));
        assert!(Credential::from_basic_header(&header).is_some());
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(Credential::from_basic_header("Bearer abc.def").is_none());
        assert!(Credential::from_basic_header("Basic !!!not-base64").is_none());
        assert!(Credential::from_basic_header(&basic("no-colon")).is_none());
        assert!(Credential::from_basic_header(&basic(":secret")).is_none());
        assert!(Credential::from_basic_header("Basic").is_none());
    }

    #[test]
    fn test_decoy_hash_uses_current_cost() {
        let cheap = decoy_hash(&PasswordEncoder::with_cost(8, 1).unwrap()).unwrap();
        let costly = decoy_hash(&PasswordEncoder::with_cost(64, 3).unwrap()).unwrap();

        assert!(cheap.starts_with("$argon2id$"));
        assert!(cheap.contains("m=8,t=1"), "{cheap}");
        assert!(costly.contains("m=64,t=3"), "{costly}");
    }

    #[test]
    fn test_debug_hides_secret() {
        let printed = format!("{:?}", Credential::new("admin", "admin123"));
        assert!(printed.contains("admin"));
        assert!(!printed.contains("admin123"));
    }
}
