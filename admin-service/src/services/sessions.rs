//! Opaque server-side session tokens.
//!
//! The client holds a random token; only its SHA-256 digest is stored, so a
//! leaked sessions table cannot be replayed.

use chrono::{Duration, Utc};
use service_core::utils::signature::{random_hex, sha256_hex};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::models::{RevokeReason, Session, SessionInvalid};
use crate::services::database::Database;
use crate::services::error::ServiceResult;

const TOKEN_BYTES: usize = 32;

pub fn hash_token(token: &str) -> String {
    sha256_hex(token)
}

/// A freshly created session and the only copy of its raw token.
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    config: SessionConfig,
}

impl SessionService {
    pub fn new(db: Database, config: SessionConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> ServiceResult<IssuedSession> {
        let token = random_hex(TOKEN_BYTES);
        let session = Session::new(
            user_id,
            hash_token(&token),
            ip_address,
            user_agent,
            Duration::days(self.config.lifetime_days),
        );
        let evicted = self
            .db
            .insert_session_with_limit(&session, self.config.max_concurrent)
            .await?;
        if evicted > 0 {
            tracing::info!(user_id = %user_id, evicted, "Oldest sessions revoked: MAX_SESSIONS_REACHED");
        }
        metrics::counter!("admin_sessions_created_total").increment(1);
        Ok(IssuedSession { token, session })
    }

    /// Resolves a raw token to a live session and records activity on it.
    pub async fn validate(&self, token: &str) -> ServiceResult<Session> {
        let session = self
            .db
            .find_session_by_token_hash(&hash_token(token))
            .await?
            .ok_or(SessionInvalid::NotFound)?;
        session.check(Utc::now(), Duration::minutes(self.config.idle_timeout_minutes))?;
        self.db.touch_session(session.id).await?;
        Ok(session)
    }

    pub async fn revoke(&self, session_id: Uuid, user_id: Uuid, reason: RevokeReason) -> ServiceResult<bool> {
        self.db.revoke_session(session_id, user_id, reason).await
    }

    /// Logout by raw token. Unknown tokens are ignored.
    pub async fn revoke_token(&self, token: &str) -> ServiceResult<()> {
        if let Some(session) = self.db.find_session_by_token_hash(&hash_token(token)).await? {
            self.db
                .revoke_session(session.id, session.user_id, RevokeReason::Logout)
                .await?;
        }
        Ok(())
    }

    pub async fn revoke_all(&self, user_id: Uuid, reason: RevokeReason) -> ServiceResult<u64> {
        self.db.revoke_all_sessions(user_id, reason).await
    }

    pub async fn list_active(&self, user_id: Uuid) -> ServiceResult<Vec<Session>> {
        self.db.list_active_sessions(user_id).await
    }

    pub async fn cleanup_expired(&self) -> ServiceResult<u64> {
        let swept = self.db.revoke_expired_sessions().await?;
        tracing::info!(swept, "Expired sessions cleaned up");
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_and_not_the_token() {
        let token = random_hex(TOKEN_BYTES);
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_ne!(hash_token(&token), hash_token(&random_hex(TOKEN_BYTES)));
    }
}
