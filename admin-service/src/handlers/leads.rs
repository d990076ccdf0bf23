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
        leads::{CreateLeadRequest, LeadListQuery, UpdateLeadRequest},
        DeleteQuery, ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, Lead, Permission},
    services::database::LeadChanges,
    utils::{Page, PageQuery, ValidatedJson},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/leads",
    params(LeadListQuery, PageQuery),
    responses(
        (status = 200, description = "Page of leads"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_leads(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<LeadListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Lead>>, AppError> {
    let admin = admin.require(&[Permission::LeadsRead])?;
    let scope = list_scope(admin, query.tenant_id)?;
    let params = page_params(page)?;
    let rows = state
        .db
        .list_leads(scope, query.status, query.include_deleted, &params)
        .await?;
    Ok(Json(Page::from_rows(rows, &params, |l| l.id)))
}

#[utoipa::path(
    post,
    path = "/api/admin/leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 201, description = "Lead created", body = Lead),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_lead(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let admin = admin.require(&[Permission::LeadsWrite])?;
    let tenant_id = list_scope(admin, req.tenant_id)?.tenant_id();

    let lead = Lead::new(
        tenant_id,
        req.name,
        req.email,
        req.company,
        req.message,
        req.budget,
        req.source.or_else(|| Some("admin".to_string())),
    );
    let lead = state.db.insert_lead(&lead).await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("lead.create", "lead")
            .resource_id(lead.id)
            .after(&lead),
    );
    Ok((StatusCode::CREATED, Json(lead)))
}

#[utoipa::path(
    get,
    path = "/api/admin/leads/{id}",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Lead", body = Lead),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn get_lead(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let admin = admin.require(&[Permission::LeadsRead])?;
    let lead = state
        .db
        .find_live::<Lead>(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Lead"))?;
    Ok(Json(lead))
}

#[utoipa::path(
    patch,
    path = "/api/admin/leads/{id}",
    params(("id" = Uuid, Path, description = "Lead id")),
    request_body = UpdateLeadRequest,
    responses(
        (status = 200, description = "Lead updated", body = Lead),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn update_lead(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    let admin = admin.require(&[Permission::LeadsWrite])?;
    let scope = row_scope(admin);

    let before = state
        .db
        .find_live::<Lead>(id, scope)
        .await?
        .ok_or_else(|| not_found("Lead"))?;
    let changes = LeadChanges {
        status: req.status,
        company: req.company,
        message: req.message,
        budget: req.budget,
    };
    let after = state
        .db
        .update_lead(id, scope, changes)
        .await?
        .ok_or_else(|| not_found("Lead"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("lead.update", "lead")
            .resource_id(id)
            .before(&before)
            .after(&after),
    );
    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/api/admin/leads/{id}",
    params(("id" = Uuid, Path, description = "Lead id"), DeleteQuery),
    responses(
        (status = 204, description = "Lead deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::LeadsWrite])?;
    query.validate()?;

    let deleted = state
        .db
        .soft_delete::<Lead>(id, row_scope(admin), Some(admin.id), query.reason.clone())
        .await?
        .ok_or_else(|| not_found("Lead"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("lead.delete", "lead")
            .resource_id(id)
            .before(&deleted)
            .after(&serde_json::json!({ "reason": query.reason })),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/leads/{id}/restore",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Lead restored", body = Lead),
        (status = 404, description = "No deleted lead with this id", body = ErrorResponse)
    ),
    tag = "Leads",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn restore_lead(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let admin = admin.require(&[Permission::LeadsWrite])?;
    let restored = state
        .db
        .restore::<Lead>(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Deleted lead"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("lead.restore", "lead")
            .resource_id(id)
            .after(&restored),
    );
    Ok(Json(restored))
}
