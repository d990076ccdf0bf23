use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::{error::AppError, utils::client_ip::client_ip};

use crate::services::csrf::{requires_token, CSRF_COOKIE, CSRF_HEADER};
use crate::services::origin::check_same_origin;
use crate::AppState;

/// Same-origin check, then double-submit token check, on state-changing
/// methods. Clients only ever see a generic 403.
pub async fn csrf_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !requires_token(request.method()) {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    let ip = client_ip(&request);

    if let Err(e) = check_same_origin(
        state.config.security.canonical_origin.as_deref(),
        request.headers(),
    ) {
        tracing::warn!(error = %e, path = %path, ip = ?ip, "Origin check failed");
        metrics::counter!("admin_csrf_rejections_total", "check" => "origin").increment(1);
        return Err(AppError::Forbidden(anyhow::anyhow!("Origin check failed")));
    }

    let jar = CookieJar::from_headers(request.headers());
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.csrf.verify(cookie.as_deref(), header) {
        tracing::warn!(error = %e, path = %path, ip = ?ip, "CSRF check failed");
        metrics::counter!("admin_csrf_rejections_total", "check" => "token").increment(1);
        return Err(AppError::Forbidden(anyhow::anyhow!("CSRF check failed")));
    }

    Ok(next.run(request).await)
}
