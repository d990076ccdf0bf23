use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{list_scope, not_found, page_params, row_scope};
use crate::{
    dtos::{
        users::{CreateUserRequest, UpdateUserRequest, UserListQuery},
        DeleteQuery, ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, Permission, User, UserResponse},
    services::database::UserChanges,
    utils::{Page, PageQuery, Password, ValidatedJson},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserListQuery, PageQuery),
    responses(
        (status = 200, description = "Page of users"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<UserListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<UserResponse>>, AppError> {
    let admin = admin.require(&[Permission::UsersRead])?;
    let scope = list_scope(admin, query.tenant_id)?;
    let params = page_params(page)?;

    let rows = state
        .db
        .list_users(scope, query.include_deleted, &params)
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();
    Ok(Json(Page::from_rows(rows, &params, |u| u.id)))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let admin = admin.require(&[Permission::UsersWrite])?;
    // Tenant-bound admins always create inside their own tenant
    let tenant_id = list_scope(admin, req.tenant_id)?.tenant_id();

    let user = state
        .auth
        .create_user(&req.email, req.name, &Password::new(req.password), tenant_id)
        .await?;
    let response = UserResponse::from(user);

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("user.create", "user")
            .resource_id(response.id)
            .after(&response),
    );
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let admin = admin.require(&[Permission::UsersRead])?;
    let user = state
        .db
        .find_live::<User>(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("User"))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Tenant move not allowed", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let admin = admin.require(&[Permission::UsersWrite])?;
    let scope = row_scope(admin);

    if let (Some(own), Some(target)) = (admin.tenant_id, req.tenant_id) {
        if target != Some(own) {
            tracing::warn!(user_id = %admin.id, target = ?target, "Tenant-bound admin tried to move a user out of its tenant");
            return Err(AppError::Forbidden(anyhow::anyhow!("Forbidden")));
        }
    }

    let before = state
        .db
        .find_live::<User>(id, scope)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| not_found("User"))?;

    let changes = UserChanges {
        email: req.email,
        name: req.name,
        tenant_id: req.tenant_id,
    };
    let after = state
        .db
        .update_user(id, scope, changes)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| not_found("User"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("user.update", "user")
            .resource_id(id)
            .before(&before)
            .after(&after),
    );
    Ok(Json(after))
}

/// Soft-delete a user and revoke all of their sessions
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id"), DeleteQuery),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::UsersWrite])?;
    query.validate()?;
    if id == admin.id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "You cannot delete your own account"
        )));
    }

    let deleted = state
        .db
        .soft_delete_user(id, row_scope(admin), Some(admin.id), query.reason.clone())
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| not_found("User"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("user.delete", "user")
            .resource_id(id)
            .before(&deleted)
            .after(&serde_json::json!({ "reason": query.reason })),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/restore",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User restored", body = UserResponse),
        (status = 404, description = "No deleted user with this id", body = ErrorResponse)
    ),
    tag = "Users",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn restore_user(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let admin = admin.require(&[Permission::UsersWrite])?;
    let restored = state
        .db
        .restore::<User>(id, row_scope(admin))
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| not_found("Deleted user"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("user.restore", "user")
            .resource_id(id)
            .after(&restored),
    );
    Ok(Json(restored))
}
