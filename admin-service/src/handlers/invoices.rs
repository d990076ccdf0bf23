use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{list_scope, not_found, owning_tenant, page_params, row_scope};
use crate::{
    dtos::{
        billing::{CreateInvoiceRequest, InvoiceListQuery},
        DeleteQuery, ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, Invoice, InvoiceWithItems, NewInvoice, Permission},
    utils::{Page, PageQuery, ValidatedJson},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/invoices",
    params(InvoiceListQuery, PageQuery),
    responses(
        (status = 200, description = "Page of invoices"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<InvoiceListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Invoice>>, AppError> {
    let admin = admin.require(&[Permission::InvoicesRead])?;
    let scope = list_scope(admin, query.tenant_id)?;
    let params = page_params(page)?;
    let rows = state
        .db
        .list_invoices(scope, query.status, query.include_deleted, &params)
        .await?;
    Ok(Json(Page::from_rows(rows, &params, |i| i.id)))
}

/// Create an invoice; its number is allocated per tenant and issue year
#[utoipa::path(
    post,
    path = "/api/admin/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice created with number INV-{SLUG}-{YEAR}-{SEQ}", body = InvoiceWithItems),
        (status = 400, description = "Validation error or missing tenant_id", body = ErrorResponse),
        (status = 403, description = "Foreign tenant", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceWithItems>), AppError> {
    let admin = admin.require(&[Permission::InvoicesWrite])?;
    let tenant_id = owning_tenant(admin, req.tenant_id)?;

    let issue_date = req.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    if let Some(due) = req.due_date {
        if due < issue_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "due_date must not be before issue_date"
            )));
        }
    }

    let new = NewInvoice {
        tenant_id,
        client_name: req.client_name,
        client_email: req.client_email,
        issue_date,
        due_date: req.due_date,
        notes: req.notes,
        items: req.items.into_iter().map(Into::into).collect(),
        created_by: Some(admin.id),
    };
    let created = state.db.create_invoice(&new).await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("invoice.create", "invoice")
            .resource_id(created.invoice.id)
            .after(&created),
    );
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/admin/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice with line items", body = InvoiceWithItems),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceWithItems>, AppError> {
    let admin = admin.require(&[Permission::InvoicesRead])?;
    let invoice = state
        .db
        .get_invoice(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Invoice"))?;
    Ok(Json(invoice))
}

#[utoipa::path(
    delete,
    path = "/api/admin/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice id"), DeleteQuery),
    responses(
        (status = 204, description = "Invoice deleted; its number is never reused"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    let admin = admin.require(&[Permission::InvoicesWrite])?;
    query.validate()?;

    let deleted = state
        .db
        .soft_delete::<Invoice>(id, row_scope(admin), Some(admin.id), query.reason.clone())
        .await?
        .ok_or_else(|| not_found("Invoice"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("invoice.delete", "invoice")
            .resource_id(id)
            .before(&deleted)
            .after(&serde_json::json!({ "reason": query.reason })),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/invoices/{id}/restore",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice restored", body = Invoice),
        (status = 404, description = "No deleted invoice with this id", body = ErrorResponse)
    ),
    tag = "Billing",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn restore_invoice(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let admin = admin.require(&[Permission::InvoicesWrite])?;
    let restored = state
        .db
        .restore::<Invoice>(id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("Deleted invoice"))?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("invoice.restore", "invoice")
            .resource_id(id)
            .after(&restored),
    );
    Ok(Json(restored))
}
