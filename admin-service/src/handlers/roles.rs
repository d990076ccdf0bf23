use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_can_grant, not_found, row_scope};
use crate::{
    dtos::{
        access::{CreateRoleAssignmentRequest, CreateRoleRequest, RoleAssignmentQuery},
        ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, Permission, PermissionSet, Role, RoleAssignment, RoleResponse, User},
    utils::ValidatedJson,
    AppState,
};

// ==================== Roles ====================

#[utoipa::path(
    get,
    path = "/api/admin/roles",
    responses(
        (status = 200, description = "All roles", body = [RoleResponse]),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    admin: AuthAdmin,
) -> Result<Json<Vec<RoleResponse>>, AppError> {
    admin.require(&[Permission::RolesRead])?;
    let roles = state.db.list_roles().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/admin/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 403, description = "Would grant permissions the caller lacks", body = ErrorResponse),
        (status = 409, description = "Role name taken", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<RoleResponse>), AppError> {
    let admin = admin.require(&[Permission::RolesWrite])?;
    let permissions: PermissionSet = req.permissions.into_iter().collect();
    ensure_can_grant(admin, &permissions)?;

    let role = state
        .db
        .insert_role(&Role::new(req.name, req.description, &permissions))
        .await?;
    let response = RoleResponse::from(role);

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("role.create", "role")
            .resource_id(response.id)
            .after(&response),
    );
    Ok((StatusCode::CREATED, Json(response)))
}

// ==================== Assignments ====================

#[utoipa::path(
    get,
    path = "/api/admin/role-assignments",
    params(RoleAssignmentQuery),
    responses(
        (status = 200, description = "Role assignments", body = [RoleAssignment]),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_role_assignments(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<RoleAssignmentQuery>,
) -> Result<Json<Vec<RoleAssignment>>, AppError> {
    let admin = admin.require(&[Permission::AssignmentsRead])?;

    // Tenant-bound admins only see assignments of users inside their tenant
    if let Some(user_id) = query.user_id {
        state
            .db
            .find_live::<User>(user_id, row_scope(admin))
            .await?
            .ok_or_else(|| not_found("User"))?;
    } else if admin.tenant_id.is_some() {
        return Err(AppError::BadRequest(anyhow::anyhow!("user_id is required")));
    }

    Ok(Json(state.db.list_role_assignments(query.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/role-assignments",
    request_body = CreateRoleAssignmentRequest,
    responses(
        (status = 201, description = "Role assigned", body = RoleAssignment),
        (status = 403, description = "Would grant permissions the caller lacks", body = ErrorResponse),
        (status = 404, description = "User or role not found", body = ErrorResponse),
        (status = 409, description = "Already assigned", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_role_assignment(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateRoleAssignmentRequest>,
) -> Result<(StatusCode, Json<RoleAssignment>), AppError> {
    let admin = admin.require(&[Permission::AssignmentsWrite])?;

    state
        .db
        .find_live::<User>(req.user_id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("User"))?;
    let role = state
        .db
        .find_role_by_id(req.role_id)
        .await?
        .ok_or_else(|| not_found("Role"))?;
    ensure_can_grant(admin, &role.permission_set())?;

    let assignment = RoleAssignment::new(
        req.user_id,
        req.role_id,
        req.scope_type,
        req.scope_id,
        Some(admin.id),
    );
    let assignment = state.db.insert_role_assignment(&assignment).await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("role_assignment.create", "role_assignment")
            .resource_id(assignment.id)
            .after(&assignment),
    );
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Remove a role assignment. This is a hard delete.
#[utoipa::path(
    delete,
    path = "/api/admin/role-assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 204, description = "Assignment removed"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_role_assignment(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::AssignmentsWrite])?;

    let existing = state
        .db
        .find_role_assignment(id)
        .await?
        .ok_or_else(|| not_found("Role assignment"))?;
    state
        .db
        .find_live::<User>(existing.user_id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Role assignment"))?;

    let removed = state
        .db
        .delete_role_assignment(id)
        .await?
        .ok_or_else(|| not_found("Role assignment"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("role_assignment.delete", "role_assignment")
            .resource_id(id)
            .before(&removed),
    );
    Ok(StatusCode::NO_CONTENT)
}
