use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{PermissionSet, Role, RoleAssignment};
use crate::services::error::ServiceResult;

impl Database {
    // ==================== Roles ====================

    pub async fn list_roles(&self) -> ServiceResult<Vec<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn find_role_by_id(&self, id: Uuid) -> ServiceResult<Option<Role>> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    #[instrument(skip(self, role), fields(role = %role.name))]
    pub async fn insert_role(&self, role: &Role) -> ServiceResult<Role> {
        Ok(sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (id, name, description, permissions, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.permissions)
        .bind(role.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    // ==================== Assignments ====================

    pub async fn list_role_assignments(&self, user_id: Option<Uuid>) -> ServiceResult<Vec<RoleAssignment>> {
        Ok(sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT * FROM role_assignments
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn find_role_assignment(&self, id: Uuid) -> ServiceResult<Option<RoleAssignment>> {
        Ok(
            sqlx::query_as::<_, RoleAssignment>("SELECT * FROM role_assignments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Duplicate (user, role, scope) tuples surface as a unique violation.
    #[instrument(skip(self, assignment), fields(user_id = %assignment.user_id, role_id = %assignment.role_id))]
    pub async fn insert_role_assignment(&self, assignment: &RoleAssignment) -> ServiceResult<RoleAssignment> {
        Ok(sqlx::query_as::<_, RoleAssignment>(
            r#"
            INSERT INTO role_assignments (id, user_id, role_id, scope_type, scope_id, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.user_id)
        .bind(assignment.role_id)
        .bind(&assignment.scope_type)
        .bind(assignment.scope_id)
        .bind(assignment.created_by)
        .bind(assignment.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Hard delete; assignments are join rows.
    pub async fn delete_role_assignment(&self, id: Uuid) -> ServiceResult<Option<RoleAssignment>> {
        Ok(sqlx::query_as::<_, RoleAssignment>(
            "DELETE FROM role_assignments WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ==================== Effective permissions ====================

    /// Role names and the union of permissions from standing assignments
    /// and unexpired approved JIT grants.
    #[instrument(skip(self))]
    pub async fn effective_permissions(&self, user_id: Uuid) -> ServiceResult<(Vec<String>, PermissionSet)> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT DISTINCT r.* FROM roles r
            WHERE r.id IN (
                SELECT role_id FROM role_assignments WHERE user_id = $1
                UNION
                SELECT role_id FROM jit_access_requests
                WHERE user_id = $1 AND status = 'approved' AND role_id IS NOT NULL AND expires_at > $2
            )
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        let mut permissions = PermissionSet::new();
        for role in &roles {
            permissions.extend(&role.permission_set());
        }
        Ok((roles.into_iter().map(|r| r.name).collect(), permissions))
    }
}
