use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Grant of a role to a user, globally or on one resource.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub scope_type: Option<String>,
    pub scope_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RoleAssignment {
    pub fn new(
        user_id: Uuid,
        role_id: Uuid,
        scope_type: Option<String>,
        scope_id: Option<Uuid>,
        created_by: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            scope_type,
            scope_id,
            created_by,
            created_at: Utc::now(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope_type.is_none() && self.scope_id.is_none()
    }
}
