use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{list_scope, not_found, owning_tenant, page_params, row_scope};
use crate::{
    dtos::{
        billing::{CreateProposalRequest, ProposalListQuery, UpdateProposalRequest},
        DeleteQuery, ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{
        AuditEntry, NewProposalItem, Permission, Proposal, ProposalChanges, ProposalWithItems,
        Tenant,
    },
    services::TenantFilter,
    utils::{Page, PageQuery, ValidatedJson},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/proposals",
    params(ProposalListQuery, PageQuery),
    responses(
        (status = 200, description = "Page of proposals"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_proposals(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<ProposalListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Proposal>>, AppError> {
    let admin = admin.require(&[Permission::ProposalsRead])?;
    let scope = list_scope(admin, query.tenant_id)?;
    let params = page_params(page)?;
    let rows = state.db.list_proposals(scope, query.status, &params).await?;
    Ok(Json(Page::from_rows(rows, &params, |p| p.id)))
}

#[utoipa::path(
    post,
    path = "/api/admin/proposals",
    request_body = CreateProposalRequest,
    responses(
        (status = 201, description = "Proposal created as draft", body = ProposalWithItems),
        (status = 400, description = "Validation error or missing tenant_id", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_proposal(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalWithItems>), AppError> {
    let admin = admin.require(&[Permission::ProposalsWrite])?;
    let tenant_id = owning_tenant(admin, req.tenant_id)?;
    state
        .db
        .find_live::<Tenant>(tenant_id, TenantFilter::Unscoped)
        .await?
        .ok_or_else(|| not_found("Tenant"))?;

    let proposal = Proposal::new(
        tenant_id,
        req.title,
        req.client_email,
        req.valid_until,
        req.notes,
        Some(admin.id),
    );
    let items: Vec<NewProposalItem> = req.items.into_iter().map(Into::into).collect();
    let created = state.db.create_proposal(&proposal, &items).await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("proposal.create", "proposal")
            .resource_id(created.proposal.id)
            .after(&created),
    );
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/admin/proposals/{id}",
    params(("id" = Uuid, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal with line items", body = ProposalWithItems),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn get_proposal(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<ProposalWithItems>, AppError> {
    let admin = admin.require(&[Permission::ProposalsRead])?;
    let proposal = state
        .db
        .get_proposal(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Proposal"))?;
    Ok(Json(proposal))
}

/// Update a proposal. A present `items` array replaces every line item and
/// the total in the same transaction.
#[utoipa::path(
    patch,
    path = "/api/admin/proposals/{id}",
    params(("id" = Uuid, Path, description = "Proposal id")),
    request_body = UpdateProposalRequest,
    responses(
        (status = 200, description = "Proposal updated", body = ProposalWithItems),
        (status = 403, description = "Approval decision without proposals.approve", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn update_proposal(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateProposalRequest>,
) -> Result<Json<ProposalWithItems>, AppError> {
    if req.status.map(|s| s.is_decision()).unwrap_or(false) {
        admin.require(&[Permission::ProposalsWrite, Permission::ProposalsApprove])?;
    }
    let admin = admin.require(&[Permission::ProposalsWrite])?;
    let scope = row_scope(admin);

    let before = state
        .db
        .get_proposal(id, scope)
        .await?
        .ok_or_else(|| not_found("Proposal"))?;

    let changes = ProposalChanges {
        title: req.title,
        client_email: req.client_email,
        status: req.status,
        valid_until: req.valid_until,
        notes: req.notes,
        items: req.items.map(|items| items.into_iter().map(Into::into).collect()),
        decision_comment: req.comment,
    };
    let after = state.db.update_proposal(id, scope, changes, admin.id).await?;

    let action = match req.status {
        Some(status) if status.is_decision() => format!("proposal.{}", status.as_str()),
        _ => "proposal.update".to_string(),
    };
    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new(action, "proposal")
            .resource_id(id)
            .before(&before)
            .after(&after),
    );
    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/api/admin/proposals/{id}",
    params(("id" = Uuid, Path, description = "Proposal id"), DeleteQuery),
    responses(
        (status = 204, description = "Proposal deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_proposal(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::ProposalsWrite])?;
    query.validate()?;

    let deleted = state
        .db
        .soft_delete::<Proposal>(id, row_scope(admin), Some(admin.id), query.reason.clone())
        .await?
        .ok_or_else(|| not_found("Proposal"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("proposal.delete", "proposal")
            .resource_id(id)
            .before(&deleted)
            .after(&serde_json::json!({ "reason": query.reason })),
    );
    Ok(StatusCode::NO_CONTENT)
}
