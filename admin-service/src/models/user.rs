//! User model - portal accounts, optionally bound to a tenant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::soft_delete::impl_soft_delete;

/// User entity. A `tenant_id` of `None` marks a global user.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    /// AES-256-GCM encrypted base32 TOTP secret.
    pub mfa_secret: Option<String>,
    /// SHA-256 hashes of unused backup codes.
    pub mfa_backup_codes: Vec<String>,
    pub tenant_id: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub delete_reason: Option<String>,
}

impl_soft_delete!(User, "users", "user", "tenant_id");

impl User {
    pub fn new(
        email: String,
        name: Option<String>,
        password_hash: Option<String>,
        tenant_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            name,
            password_hash,
            mfa_secret: None,
            mfa_backup_codes: Vec::new(),
            tenant_id,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
        }
    }

    pub fn mfa_enabled(&self) -> bool {
        self.mfa_secret.is_some()
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }
}

/// User representation without credentials.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub mfa_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            mfa_enabled: u.mfa_enabled(),
            id: u.id,
            email: u.email,
            name: u.name,
            tenant_id: u.tenant_id,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
            deleted_at: u.deleted_at,
        }
    }
}

/// Stored hash of a previously used password.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
