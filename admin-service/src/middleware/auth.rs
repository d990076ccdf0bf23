use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::{AdminUser, Permission};
use crate::AppState;

/// Session token from the session cookie, else an `Authorization: Bearer`
/// header.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the caller to an [`AdminUser`] and stores it in request
/// extensions.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(req.headers(), &state.config.session.cookie_name)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("No session token")))?;

    let admin = state.auth.resolve_admin(&token).await.map_err(|e| {
        tracing::warn!(error = %e, path = %req.uri().path(), "Session rejected");
        AppError::from(e)
    })?;

    req.extensions_mut().insert(admin);
    Ok(next.run(req).await)
}

/// Extractor for the authenticated admin placed by
/// [`session_auth_middleware`].
pub struct AuthAdmin(pub AdminUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminUser>()
            .cloned()
            .map(AuthAdmin)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Admin context missing")))
    }
}

impl AuthAdmin {
    /// 403 unless every permission is held.
    pub fn require(&self, required: &[Permission]) -> Result<&AdminUser, AppError> {
        match self.0.missing(required) {
            None => Ok(&self.0),
            Some(missing) => {
                tracing::warn!(
                    user_id = %self.0.id,
                    permission = %missing,
                    "Permission denied"
                );
                Err(AppError::Forbidden(anyhow::anyhow!(
                    "Missing permission {}",
                    missing
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("admin_session=abc; other=1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers, "admin_session").as_deref(), Some("abc"));

        headers.remove(header::COOKIE);
        assert_eq!(session_token(&headers, "admin_session").as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(session_token(&headers, "admin_session"), None);
    }

    #[test]
    fn require_checks_every_permission() {
        let admin = AuthAdmin(AdminUser {
            id: Uuid::new_v4(),
            email: "ops@example.com".into(),
            name: None,
            roles: vec!["support".into()],
            permissions: [Permission::LeadsRead].into_iter().collect(),
            tenant_id: None,
            session_id: Uuid::new_v4(),
        });
        assert!(admin.require(&[Permission::LeadsRead]).is_ok());
        assert!(matches!(
            admin.require(&[Permission::LeadsRead, Permission::LeadsWrite]),
            Err(AppError::Forbidden(_))
        ));
    }
}
