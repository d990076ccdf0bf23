use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::UserResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ops@agency.example")]
    pub email: String,

    #[validate(length(min = 1, max = 256, message = "Password is required"))]
    pub password: String,

    /// TOTP code or unused backup code, once the first attempt answered
    /// `MFA_REQUIRED`.
    #[validate(length(max = 32))]
    #[schema(example = "123456")]
    pub mfa_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// Same value as the session cookie, for API clients.
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 12, max = 256, message = "New password must be 12 to 256 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChangePasswordResponse {
    pub revoked_sessions: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaSetupResponse {
    #[schema(example = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")]
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnableMfaRequest {
    #[validate(length(min = 16, max = 64, message = "Invalid secret"))]
    pub secret: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnableMfaResponse {
    /// Shown once; only hashes are stored.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DisableMfaRequest {
    #[validate(length(min = 6, max = 32, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCleanupResponse {
    pub swept: u64,
}
