//! Tenant model - a client organisation whose data is isolated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::soft_delete::impl_soft_delete;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Tenant {
    pub id: Uuid,
    /// URL-safe identifier, also embedded in invoice numbers.
    pub slug: String,
    pub name: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_by: Option<Uuid>,
    #[serde(skip)]
    pub delete_reason: Option<String>,
}

impl_soft_delete!(Tenant, "tenants", "tenant", "id");

impl Tenant {
    pub fn new(slug: String, name: String, contact_email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.to_lowercase(),
            name,
            contact_email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
        }
    }
}
