use axum::{extract::State, http::HeaderMap, Json};
use secrecy::ExposeSecret;
use service_core::{error::AppError, utils::signature::constant_time_eq};

use crate::{
    dtos::{auth::SessionCleanupResponse, ErrorResponse},
    middleware::RequestMeta,
    models::AuditEntry,
    AppState,
};

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Sweep expired sessions. Called by the scheduler with `Authorization: Bearer <CRON_SECRET>`.
#[utoipa::path(
    post,
    path = "/api/cron/session-cleanup",
    responses(
        (status = 200, description = "Expired sessions revoked", body = SessionCleanupResponse),
        (status = 401, description = "Missing or wrong cron secret", body = ErrorResponse)
    ),
    tag = "Operations",
    security(("bearer_auth" = []))
)]
pub async fn session_cleanup(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
) -> Result<Json<SessionCleanupResponse>, AppError> {
    // No configured secret means the endpoint is closed
    let authorized = match (&state.config.security.cron_secret, bearer(&headers)) {
        (Some(secret), Some(given)) => {
            constant_time_eq(secret.expose_secret().as_bytes(), given.as_bytes())
        }
        _ => false,
    };
    if !authorized {
        tracing::warn!(ip = ?meta.ip_address, "Cron request rejected");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid cron secret")));
    }

    let swept = state.sessions.cleanup_expired().await?;
    state.audit.record(
        &meta.system_actor(),
        AuditEntry::new("session.cleanup", "session").after(&serde_json::json!({ "swept": swept })),
    );
    Ok(Json(SessionCleanupResponse { swept }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(bearer(&headers), Some("s3cret"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer(&headers), None);
    }
}
