use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use service_core::utils::client_ip::client_ip_behind_proxies;

use crate::config::AdminRoutesConfig;
use crate::services::AccessDecision;
use crate::AppState;

/// IP, geo and time restrictions for admin paths. Denied page requests are
/// redirected to the error page with the reason code; API requests get a
/// 403 carrying the same code.
pub async fn access_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !state.access_policy.is_restricted() || !state.config.admin_routes.is_gated(&path) {
        return next.run(request).await;
    }

    let ip = client_ip_behind_proxies(
        &request,
        state.config.access.ip_allowlist.trusted_proxy_hops,
    );
    let country = request
        .headers()
        .get(state.config.access.geo.country_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let reason = match state
        .access_policy
        .evaluate(ip.as_deref(), country, Utc::now())
    {
        AccessDecision::Allow => return next.run(request).await,
        AccessDecision::Deny(reason) => reason,
    };

    tracing::warn!(
        reason = %reason,
        ip = ip.as_deref().unwrap_or("unknown"),
        country = country.unwrap_or("-"),
        path = %path,
        "Admin access denied"
    );
    metrics::counter!("admin_access_denied_total", "reason" => reason.as_str()).increment(1);

    if AdminRoutesConfig::is_api(&path) {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied", "reason": reason.as_str() })),
        )
            .into_response()
    } else {
        let target = format!(
            "{}?error={}",
            state.config.admin_routes.error_path,
            reason.as_str()
        );
        Redirect::temporary(&target).into_response()
    }
}
