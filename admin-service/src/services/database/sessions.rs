use sqlx::{Executor, Postgres};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{RevokeReason, Session};
use crate::services::error::ServiceResult;

/// Revokes every live session of a user. Usable inside a transaction.
pub(crate) async fn revoke_user_sessions<'e, E>(
    executor: E,
    user_id: Uuid,
    reason: RevokeReason,
) -> ServiceResult<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE sessions SET revoked_at = NOW(), revoke_reason = $2 WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .bind(reason.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

impl Database {
    /// Inserts a session, first revoking the least recently active ones so
    /// the user keeps at most `max_active` live sessions. The user row is
    /// locked so concurrent logins cannot both slip under the limit.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn insert_session_with_limit(
        &self,
        session: &Session,
        max_active: i64,
    ) -> ServiceResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(session.user_id)
            .execute(&mut *tx)
            .await?;

        let evicted = sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = NOW(), revoke_reason = $3
            WHERE id IN (
                SELECT id FROM sessions
                WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
                ORDER BY last_active_at DESC
                OFFSET $2
            )
            "#,
        )
        .bind(session.user_id)
        .bind((max_active - 1).max(0))
        .bind(RevokeReason::MaxSessionsReached.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, ip_address, user_agent, device_info,
                                  created_at, last_active_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.device_info)
        .bind(session.created_at)
        .bind(session.last_active_at)
        .bind(session.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(evicted)
    }

    pub async fn find_session_by_token_hash(&self, token_hash: &str) -> ServiceResult<Option<Session>> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn touch_session(&self, session_id: Uuid) -> ServiceResult<()> {
        sqlx::query("UPDATE sessions SET last_active_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revokes one of the user's live sessions. `false` if there was none.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        reason: RevokeReason,
    ) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = NOW(), revoke_reason = $3
            WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn revoke_all_sessions(&self, user_id: Uuid, reason: RevokeReason) -> ServiceResult<u64> {
        revoke_user_sessions(&self.pool, user_id, reason).await
    }

    pub async fn list_active_sessions(&self, user_id: Uuid) -> ServiceResult<Vec<Session>> {
        Ok(sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            ORDER BY last_active_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Marks past-expiry sessions revoked. Returns how many were swept.
    #[instrument(skip(self))]
    pub async fn revoke_expired_sessions(&self) -> ServiceResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW(), revoke_reason = $1 WHERE revoked_at IS NULL AND expires_at < NOW()",
        )
        .bind(RevokeReason::Expired.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
