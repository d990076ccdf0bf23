use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use service_core::utils::client_ip::forwarded_ip;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::{AdminUser, AuditActor};

/// Client address and user agent of the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn actor(&self, admin: &AdminUser) -> AuditActor {
        AuditActor {
            id: Some(admin.id),
            email: Some(admin.email.clone()),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Actor for writes not tied to a signed-in admin, such as cron jobs.
    pub fn system_actor(&self) -> AuditActor {
        AuditActor {
            id: None,
            email: None,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = forwarded_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(512).collect());
        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}
