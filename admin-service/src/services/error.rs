use service_core::error::AppError;
use thiserror::Error;

use crate::models::SessionInvalid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("MFA code required")]
    MfaRequired,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("Too many attempts")]
    RateLimited { retry_after_secs: u64 },

    #[error("Session invalid: {0}")]
    Session(#[from] SessionInvalid),

    #[error("Password rejected")]
    WeakPassword(Vec<String>),

    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!("Resource already exists"))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!(e)),
            },
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            // The login handler renders these two itself; anywhere else they
            // are plain authentication failures.
            ServiceError::MfaRequired => AppError::Unauthorized(anyhow::anyhow!("MFA_REQUIRED")),
            ServiceError::InvalidMfaCode => {
                AppError::Unauthorized(anyhow::anyhow!("INVALID_MFA_CODE"))
            }
            ServiceError::RateLimited { retry_after_secs } => AppError::TooManyRequests(
                "Too many attempts. Please try again later.".to_string(),
                Some(retry_after_secs),
            ),
            ServiceError::Session(reason) => AppError::Unauthorized(anyhow::anyhow!(reason)),
            ServiceError::WeakPassword(reasons) => {
                AppError::BadRequest(anyhow::anyhow!(reasons.join("; ")))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::InvalidState(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
