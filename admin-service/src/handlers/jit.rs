use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_can_grant, not_found, row_scope};
use crate::{
    dtos::{
        access::{CreateJitRequest, JitListQuery},
        ErrorResponse,
    },
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, JitAccessRequest, JitStatus, Permission, User},
    utils::ValidatedJson,
    AppState,
};

/// List JIT requests. Holders of `jit.read` see everyone's; requesters only their own.
#[utoipa::path(
    get,
    path = "/api/admin/jit/requests",
    params(JitListQuery),
    responses(
        (status = 200, description = "JIT access requests", body = [JitAccessRequest]),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_jit_requests(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(query): Query<JitListQuery>,
) -> Result<Json<Vec<JitAccessRequest>>, AppError> {
    let user_filter = if admin.0.can(Permission::JitRead) {
        query.user_id
    } else {
        let admin = admin.require(&[Permission::JitRequest])?;
        Some(admin.id)
    };

    let requests = state.db.list_jit_requests(user_filter, query.status).await?;
    Ok(Json(requests))
}

#[utoipa::path(
    post,
    path = "/api/admin/jit/requests",
    request_body = CreateJitRequest,
    responses(
        (status = 201, description = "Request filed", body = JitAccessRequest),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn create_jit_request(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<CreateJitRequest>,
) -> Result<(StatusCode, Json<JitAccessRequest>), AppError> {
    let admin = admin.require(&[Permission::JitRequest])?;
    if let Some(role_id) = req.role_id {
        state
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| not_found("Role"))?;
    }

    let request = JitAccessRequest::new(admin.id, req.role_id, req.reason, req.duration_minutes);
    let request = state.db.insert_jit_request(&request).await?;

    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("jit.request", "jit_access_request")
            .resource_id(request.id)
            .after(&request),
    );
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    post,
    path = "/api/admin/jit/requests/{id}/approve",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Approved; active until expires_at", body = JitAccessRequest),
        (status = 400, description = "Request is not pending", body = ErrorResponse),
        (status = 403, description = "Self-approval or escalation", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn approve_jit_request(
    state: State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    id: Path<Uuid>,
) -> Result<Json<JitAccessRequest>, AppError> {
    decide(state, admin, meta, id, JitStatus::Approved).await
}

#[utoipa::path(
    post,
    path = "/api/admin/jit/requests/{id}/deny",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Denied", body = JitAccessRequest),
        (status = 400, description = "Request is not pending", body = ErrorResponse),
        (status = 403, description = "Self-approval", body = ErrorResponse)
    ),
    tag = "Access control",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn deny_jit_request(
    state: State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    id: Path<Uuid>,
) -> Result<Json<JitAccessRequest>, AppError> {
    decide(state, admin, meta, id, JitStatus::Denied).await
}

async fn decide(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    decision: JitStatus,
) -> Result<Json<JitAccessRequest>, AppError> {
    let admin = admin.require(&[Permission::JitApprove])?;

    let request = state
        .db
        .find_jit_request(id)
        .await?
        .ok_or_else(|| not_found("JIT access request"))?;
    state
        .db
        .find_live::<User>(request.user_id, row_scope(admin))
        .await?
        .ok_or_else(|| not_found("JIT access request"))?;
    if request.user_id == admin.id {
        tracing::warn!(user_id = %admin.id, request_id = %id, "JIT self-approval blocked");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "You cannot decide your own request"
        )));
    }
    if let (JitStatus::Approved, Some(role_id)) = (decision, request.role_id) {
        if let Some(role) = state.db.find_role_by_id(role_id).await? {
            ensure_can_grant(admin, &role.permission_set())?;
        }
    }

    let decided = state
        .db
        .decide_jit_request(id, admin.id, decision, Utc::now())
        .await?;

    let action = match decision {
        JitStatus::Approved => "jit.approve",
        _ => "jit.deny",
    };
    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new(action, "jit_access_request")
            .resource_id(id)
            .after(&decided),
    );
    Ok(Json(decided))
}
