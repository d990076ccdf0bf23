use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use service_core::error::AppError;

use super::{csrf_cookie, expired_session_cookie, session_cookie};
use crate::{
    dtos::{
        auth::{
            ChangePasswordRequest, ChangePasswordResponse, CsrfTokenResponse, DisableMfaRequest,
            EnableMfaRequest, EnableMfaResponse, LoginRequest, LoginResponse, MfaSetupResponse,
        },
        ErrorResponse,
    },
    middleware::{session_token, AuthAdmin, RequestMeta},
    models::{AdminUserResponse, AuditActor, AuditEntry},
    services::{
        auth::{LoginAttempt, LoginSuccess},
        csrf::CSRF_COOKIE,
        ServiceError,
    },
    utils::{Password, ValidatedJson},
    AppState,
};

fn mfa_challenge(code: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": code, "mfa_required": true })),
    )
        .into_response()
}

/// Password login, with a second round trip when MFA is enrolled
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created; cookie set", body = LoginResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials, MFA_REQUIRED or INVALID_MFA_CODE", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Response, AppError> {
    let attempt = LoginAttempt {
        email: req.email.trim().to_lowercase(),
        password: Password::new(req.password),
        mfa_code: req.mfa_code,
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
    };

    let LoginSuccess { user, session } = match state.auth.login(attempt).await {
        Ok(success) => success,
        Err(ServiceError::MfaRequired) => return Ok(mfa_challenge("MFA_REQUIRED")),
        Err(ServiceError::InvalidMfaCode) => return Ok(mfa_challenge("INVALID_MFA_CODE")),
        Err(e) => return Err(e.into()),
    };

    let actor = AuditActor {
        id: Some(user.id),
        email: Some(user.email.clone()),
        ip_address: meta.ip_address,
        user_agent: meta.user_agent,
    };
    state.audit.record(
        &actor,
        AuditEntry::new("auth.login", "session").resource_id(session.session.id),
    );

    let cookie = session_cookie(&state.config, session.token.clone());
    let body = LoginResponse {
        user: user.into(),
        token: session.token,
        session_id: session.session.id,
        expires_at: session.session.expires_at,
    };
    Ok((jar.add(cookie), Json(body)).into_response())
}

/// Revoke the current session and clear its cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token(&headers, &state.config.session.cookie_name) {
        state.auth.sessions().revoke_token(&token).await?;
    }
    Ok((jar.add(expired_session_cookie(&state.config)), StatusCode::NO_CONTENT))
}

/// Issue a CSRF token, reusing the current cookie while it is still valid
#[utoipa::path(
    get,
    path = "/api/admin/csrf",
    responses((status = 200, description = "Token for the x-csrf-token header", body = CsrfTokenResponse)),
    tag = "Authentication"
)]
pub async fn csrf_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(existing) = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| state.csrf.is_well_formed(v))
    {
        return Ok((jar, Json(CsrfTokenResponse { csrf_token: existing })));
    }

    let token = state.csrf.issue()?;
    let jar = jar.add(csrf_cookie(&state.config, token.clone()));
    Ok((jar, Json(CsrfTokenResponse { csrf_token: token })))
}

/// The signed-in admin with effective permissions
#[utoipa::path(
    get,
    path = "/api/admin/me",
    responses(
        (status = 200, description = "Current admin", body = AdminUserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn me(admin: AuthAdmin) -> Json<AdminUserResponse> {
    Json(AdminUserResponse::from(&admin.0))
}

/// Change password; every session of the user is revoked
#[utoipa::path(
    post,
    path = "/api/admin/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ChangePasswordResponse),
        (status = 400, description = "Password rejected by policy", body = ErrorResponse),
        (status = 401, description = "Current password wrong", body = ErrorResponse),
        (status = 403, description = "CSRF or origin check failed", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin = admin.0;
    let revoked = state
        .auth
        .change_password(
            admin.id,
            &Password::new(req.current_password),
            &Password::new(req.new_password),
        )
        .await?;

    state.audit.record(
        &meta.actor(&admin),
        AuditEntry::new("auth.password_changed", "user")
            .resource_id(admin.id)
            .after(&json!({ "revoked_sessions": revoked })),
    );

    Ok((
        jar.add(expired_session_cookie(&state.config)),
        Json(ChangePasswordResponse {
            revoked_sessions: revoked,
        }),
    ))
}

/// Start MFA enrolment with a fresh secret
#[utoipa::path(
    post,
    path = "/api/admin/auth/mfa/generate",
    responses(
        (status = 200, description = "Secret and provisioning URI", body = MfaSetupResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn generate_mfa(
    State(state): State<AppState>,
    admin: AuthAdmin,
) -> Result<Json<MfaSetupResponse>, AppError> {
    let enrollment = state.auth.generate_mfa(&admin.0).await?;
    Ok(Json(MfaSetupResponse {
        secret: enrollment.secret,
        otpauth_uri: enrollment.otpauth_uri,
    }))
}

/// Confirm a secret with a code and turn MFA on
#[utoipa::path(
    post,
    path = "/api/admin/auth/mfa/enable",
    request_body = EnableMfaRequest,
    responses(
        (status = 200, description = "MFA enabled; backup codes shown once", body = EnableMfaResponse),
        (status = 400, description = "MFA already enabled", body = ErrorResponse),
        (status = 401, description = "Invalid code", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn enable_mfa(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<EnableMfaRequest>,
) -> Result<Json<EnableMfaResponse>, AppError> {
    let admin = admin.0;
    let backup_codes = state.auth.enable_mfa(&admin, &req.secret, &req.code).await?;
    state.audit.record(
        &meta.actor(&admin),
        AuditEntry::new("auth.mfa_enabled", "user").resource_id(admin.id),
    );
    Ok(Json(EnableMfaResponse { backup_codes }))
}

/// Turn MFA off; needs a current code or a backup code
#[utoipa::path(
    post,
    path = "/api/admin/auth/mfa/disable",
    request_body = DisableMfaRequest,
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 401, description = "Invalid code", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn disable_mfa(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<DisableMfaRequest>,
) -> Result<StatusCode, AppError> {
    let admin = admin.0;
    state.auth.disable_mfa(&admin, &req.code).await?;
    state.audit.record(
        &meta.actor(&admin),
        AuditEntry::new("auth.mfa_disabled", "user").resource_id(admin.id),
    );
    Ok(StatusCode::NO_CONTENT)
}
