use axum::{
    Json,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, rag::RagError};

/// Failures surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The storage backend failed mid-operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No storage backend is attached right now (degraded mode).
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A retrieval dependency (ChromaDB Cloud or the OpenAI API) failed.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] RagError),
    /// The query engine was never built because required secrets are missing.
    #[error("{0} not configured; please contact the administrator")]
    NotConfigured(&'static str),
    /// Credentials were missing, wrong, or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated but not allowed (e.g. guest hitting a registered-only route).
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// A request value failed a semantic check.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A uniqueness constraint was violated.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The addressed resource does not exist for this caller.
    #[error("not found: {0}")]
    NotFound(String),
    /// Signing a session token failed.
    #[error("failed to issue session token")]
    TokenIssue(#[source] jsonwebtoken::errors::Error),
    /// Hashing a password failed.
    #[error("failed to hash password")]
    PasswordHash(#[source] argon2::password_hash::Error),
    /// Rendering an export document failed.
    #[error("failed to render export")]
    ExportRender(#[source] serde_json::Error),
    /// The caller exhausted its fixed-window question budget.
    #[error(
        "rate limit exceeded; please wait {retry_after_secs} seconds before asking another question"
    )]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_secs: u64,
    },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { what } => ServiceError::AlreadyExists(what.to_string()),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<RagError> for ServiceError {
    fn from(err: RagError) -> Self {
        ServiceError::Retrieval(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Route-level errors, each mapping to one HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or invalid request payload.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or unverifiable session token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Valid session but insufficient rights.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Nothing lives at the requested id.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with existing data.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Too many requests inside the current rate window.
    #[error("{message}")]
    RateLimited {
        /// Human-readable description including the wait time.
        message: String,
        /// Seconds until the window resets, echoed in `Retry-After`.
        retry_after_secs: u64,
    },
    /// A dependency is down or was never configured.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Unexpected failure the client cannot fix.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Retrieval(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::NotConfigured(what) => AppError::ServiceUnavailable(format!(
                "{what} not configured; please contact the administrator"
            )),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::AlreadyExists(what) => {
                AppError::Conflict(format!("{what} already exists"))
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::TokenIssue(source) => AppError::Internal(source.to_string()),
            ServiceError::PasswordHash(source) => AppError::Internal(source.to_string()),
            ServiceError::ExportRender(source) => AppError::Internal(source.to_string()),
            ServiceError::RateLimited { retry_after_secs } => AppError::RateLimited {
                message: format!(
                    "rate limit exceeded; please wait {retry_after_secs} seconds before asking another question"
                ),
                retry_after_secs,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        if let AppError::RateLimited {
            retry_after_secs, ..
        } = &self
        {
            let headers = [(header::RETRY_AFTER, retry_after_secs.to_string())];
            return (status, headers, payload).into_response();
        }

        (status, payload).into_response()
    }
}
