use axum::{
    Json,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// Realm advertised in `WWW-Authenticate` on every 401.
pub const BASIC_REALM: &str = r#"Basic realm="space-catalog""#;

/// AppError
///
/// The single failure taxonomy of the service. Every handler, resolver and repository
/// method reports through it, and each variant maps to exactly one HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    /// No credential, or one that does not match a stored user.
    #[error("Full authentication is required to access this resource")]
    Unauthenticated,

    /// Valid credential, but the policy table does not grant the operation.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// The resource addressed by the request does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// A resource referenced from the payload (a foreign key) does not exist.
    #[error("Referenced {resource} not found: {id}")]
    ReferenceNotFound { resource: &'static str, id: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A unique key (planet name, username) is already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn reference_not_found(resource: &'static str, id: impl ToString) -> Self {
        AppError::ReferenceNotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } | AppError::ReferenceNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ValidationFailed(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code, used as `extensions.code` in GraphQL errors.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound { .. } | AppError::ReferenceNotFound { .. } => "NOT_FOUND",
            AppError::ValidationFailed(_) | AppError::Conflict(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("store error: {:?}", e);
        AppError::Internal("data store failure".to_string())
    }
}

/// ErrorBody
///
/// JSON body of every error response: `{ timestamp, status, error, message, path }`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(msg) => tracing::error!(%status, "request failed: {}", msg),
            other => tracing::debug!(%status, "request rejected: {}", other),
        }

        let body = ErrorBody {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            path: String::new(),
        };

        let mut response = (status, Json(body.clone())).into_response();
        if matches!(self, AppError::Unauthenticated) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_REALM),
            );
        }
        // The request path is not known here; `attach_error_path` fills it in.
        response.extensions_mut().insert(body);
        response
    }
}

/// attach_error_path
///
/// Router-level middleware that completes `ErrorBody.path` with the path of the request
/// that produced the error. Responses without an `ErrorBody` pass through untouched.
pub async fn attach_error_path(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let mut response = next.run(request).await;

    let Some(mut body) = response.extensions_mut().remove::<ErrorBody>() else {
        return response;
    };
    body.path = path;

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    (parts, Json(body)).into_response()
}

/// StartupError
///
/// Failures while wiring the application together. These abort startup; they never
/// reach a client.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("access policy: {0}")]
    Policy(#[from] crate::authz::PolicyError),
    #[error("password encoder: {0}")]
    Password(#[from] crate::password::PasswordError),
    #[error("seeding failed: {0}")]
    Seed(#[from] AppError),
}
