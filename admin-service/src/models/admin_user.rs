use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Permission, PermissionSet};

/// Authenticated caller of an admin route, rebuilt from the database on
/// every request so revoked roles and expired JIT grants take effect at once.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: PermissionSet,
    pub tenant_id: Option<Uuid>,
    pub session_id: Uuid,
}

impl AdminUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.has(permission)
    }

    /// First permission in `required` the user lacks, if any.
    pub fn missing(&self, required: &[Permission]) -> Option<Permission> {
        required.iter().copied().find(|p| !self.permissions.has(*p))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: Option<Uuid>,
}

impl From<&AdminUser> for AdminUserResponse {
    fn from(u: &AdminUser) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            roles: u.roles.clone(),
            permissions: u.permissions.iter().map(|p| p.as_str().to_string()).collect(),
            tenant_id: u.tenant_id,
        }
    }
}
