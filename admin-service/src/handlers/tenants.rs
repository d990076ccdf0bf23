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
        tenants::{CreateTenantRequest, UpdateTenantRequest},
        DeleteQuery, ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AdminUser, AuditEntry, Permission, Tenant},
    services::{database::TenantChanges, TenantFilter},
    utils::{Page, PageQuery, ValidatedJson},
    AppState,
};

/// Creating and deleting tenants is reserved to users not bound to one.
fn require_global(admin: &AdminUser) -> Result<(), AppError> {
    if admin.tenant_id.is_some() {
        tracing::warn!(user_id = %admin.id, "Tenant-bound admin attempted a global tenant operation");
        return Err(AppError::Forbidden(anyhow::anyhow!("Forbidden")));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/admin/tenants",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of tenants; tenant-bound users see only their own"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Tenants",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Tenant>>, AppError> {
    let admin = admin.require(&[Permission::TenantsRead])?;
    let scope = list_scope(admin, None)?;
    let params = page_params(page)?;
    let rows = state.db.list_tenants(scope, &params).await?;
    Ok(Json(Page::from_rows(rows, &params, |t| t.id)))
}

#[utoipa::path(
    post,
    path = "/api/admin/tenants",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = Tenant),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 409, description = "Slug taken", body = ErrorResponse)
    ),
    tag = "Tenants",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>), AppError> {
    let admin = admin.require(&[Permission::TenantsWrite])?;
    require_global(admin)?;

    if state.db.find_tenant_by_slug(&req.slug).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Tenant slug '{}' is already in use",
            req.slug
        )));
    }

    let tenant = state
        .db
        .insert_tenant(&Tenant::new(req.slug, req.name, req.contact_email))
        .await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("tenant.create", "tenant")
            .resource_id(tenant.id)
            .after(&tenant),
    );
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[utoipa::path(
    get,
    path = "/api/admin/tenants/{id}",
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Tenant", body = Tenant),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Tenants",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<Tenant>, AppError> {
    let admin = admin.require(&[Permission::TenantsRead])?;
    let tenant = state
        .db
        .find_live::<Tenant>(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Tenant"))?;
    Ok(Json(tenant))
}

#[utoipa::path(
    patch,
    path = "/api/admin/tenants/{id}",
    params(("id" = Uuid, Path, description = "Tenant id")),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Tenant updated", body = Tenant),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Tenants",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTenantRequest>,
) -> Result<Json<Tenant>, AppError> {
    let admin = admin.require(&[Permission::TenantsWrite])?;
    let scope = row_scope(admin);

    let before = state
        .db
        .find_live::<Tenant>(id, scope)
        .await?
        .ok_or_else(|| not_found("Tenant"))?;
    let changes = TenantChanges {
        name: req.name,
        contact_email: req.contact_email,
    };
    let after = state
        .db
        .update_tenant(id, scope, changes)
        .await?
        .ok_or_else(|| not_found("Tenant"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("tenant.update", "tenant")
            .resource_id(id)
            .before(&before)
            .after(&after),
    );
    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/api/admin/tenants/{id}",
    params(("id" = Uuid, Path, description = "Tenant id"), DeleteQuery),
    responses(
        (status = 204, description = "Tenant deleted"),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Tenants",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::TenantsWrite])?;
    require_global(admin)?;
    query.validate()?;

    let deleted = state
        .db
        .soft_delete::<Tenant>(id, TenantFilter::Unscoped, Some(admin.id), query.reason.clone())
        .await?
        .ok_or_else(|| not_found("Tenant"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("tenant.delete", "tenant")
            .resource_id(id)
            .before(&deleted)
            .after(&serde_json::json!({ "reason": query.reason })),
    );
    Ok(StatusCode::NO_CONTENT)
}
