//! Server-side login sessions.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Why a session stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    Logout,
    MaxSessionsReached,
    PasswordChanged,
    UserDeleted,
    Manual,
    Expired,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Logout => "LOGOUT",
            RevokeReason::MaxSessionsReached => "MAX_SESSIONS_REACHED",
            RevokeReason::PasswordChanged => "PASSWORD_CHANGED",
            RevokeReason::UserDeleted => "USER_DELETED",
            RevokeReason::Manual => "MANUAL",
            RevokeReason::Expired => "SESSION_EXPIRED",
        }
    }
}

/// Session validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionInvalid {
    #[error("SESSION_NOT_FOUND")]
    NotFound,
    #[error("SESSION_REVOKED")]
    Revoked,
    #[error("SESSION_EXPIRED")]
    Expired,
    #[error("SESSION_INACTIVE_TIMEOUT")]
    InactiveTimeout,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        token_hash: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            device_info: user_agent.as_deref().map(describe_device),
            ip_address,
            user_agent,
            created_at: now,
            last_active_at: now,
            expires_at: now + lifetime,
            revoked_at: None,
            revoke_reason: None,
        }
    }

    /// Check revocation, absolute expiry and idle timeout, in that order.
    pub fn check(&self, now: DateTime<Utc>, idle_timeout: Duration) -> Result<(), SessionInvalid> {
        if self.revoked_at.is_some() {
            return Err(SessionInvalid::Revoked);
        }
        if now >= self.expires_at {
            return Err(SessionInvalid::Expired);
        }
        if now - self.last_active_at > idle_timeout {
            return Err(SessionInvalid::InactiveTimeout);
        }
        Ok(())
    }
}

/// Coarse "Browser on OS" label from a user agent string.
pub fn describe_device(user_agent: &str) -> String {
    let ua = user_agent.to_lowercase();
    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("curl/") {
        "curl"
    } else {
        "Unknown browser"
    };
    let os = if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown OS"
    };
    format!("{} on {}", browser, os)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_id: Option<Uuid>) -> Self {
        Self {
            current: current_id == Some(session.id),
            id: session.id,
            ip_address: session.ip_address,
            device_info: session.device_info,
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            expires_at: session.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), "hash".into(), None, None, Duration::days(30))
    }

    #[test]
    fn fresh_session_is_valid() {
        assert_eq!(session().check(Utc::now(), Duration::hours(1)), Ok(()));
    }

    #[test]
    fn revoked_wins_over_expiry() {
        let mut s = session();
        s.revoked_at = Some(Utc::now());
        let later = Utc::now() + Duration::days(40);
        assert_eq!(s.check(later, Duration::hours(1)), Err(SessionInvalid::Revoked));
    }

    #[test]
    fn expiry_and_idle_timeout() {
        let s = session();
        assert_eq!(
            s.check(s.expires_at, Duration::days(365)),
            Err(SessionInvalid::Expired)
        );
        assert_eq!(
            s.check(s.last_active_at + Duration::minutes(61), Duration::hours(1)),
            Err(SessionInvalid::InactiveTimeout)
        );
        assert_eq!(
            s.check(s.last_active_at + Duration::minutes(60), Duration::hours(1)),
            Ok(())
        );
    }

    #[test]
    fn device_description() {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
        assert_eq!(describe_device(ua), "Safari on macOS");
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
        assert_eq!(describe_device(ua), "Chrome on Windows");
    }
}
