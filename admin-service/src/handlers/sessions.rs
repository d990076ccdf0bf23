use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

use super::{expired_session_cookie, not_found};
use crate::{
    dtos::ErrorResponse,
    middleware::{AuthAdmin, RequestMeta},
    models::{AuditEntry, RevokeReason, SessionResponse},
    AppState,
};

/// Active sessions of the signed-in admin
#[utoipa::path(
    get,
    path = "/api/admin/sessions",
    responses(
        (status = 200, description = "Active sessions, current one flagged", body = [SessionResponse]),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    admin: AuthAdmin,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let admin = admin.0;
    let sessions = state.sessions.list_active(admin.id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionResponse::from_session(s, Some(admin.session_id)))
            .collect(),
    ))
}

/// Revoke one of the admin's own sessions
#[utoipa::path(
    delete,
    path = "/api/admin/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 404, description = "No active session with this id", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let admin = admin.0;
    if !state.sessions.revoke(id, admin.id, RevokeReason::Manual).await? {
        return Err(not_found("Session"));
    }

    state.audit.record(
        &meta.actor(&admin),
        AuditEntry::new("session.revoke", "session").resource_id(id),
    );

    let jar = if id == admin.session_id {
        jar.add(expired_session_cookie(&state.config))
    } else {
        jar
    };
    Ok((jar, StatusCode::NO_CONTENT))
}
