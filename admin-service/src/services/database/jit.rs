use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{JitAccessRequest, JitStatus};
use crate::services::error::{ServiceError, ServiceResult};

impl Database {
    pub async fn list_jit_requests(
        &self,
        user_id: Option<Uuid>,
        status: Option<JitStatus>,
    ) -> ServiceResult<Vec<JitAccessRequest>> {
        Ok(sqlx::query_as::<_, JitAccessRequest>(
            r#"
            SELECT * FROM jit_access_requests
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT 200
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn find_jit_request(&self, id: Uuid) -> ServiceResult<Option<JitAccessRequest>> {
        Ok(sqlx::query_as::<_, JitAccessRequest>(
            "SELECT * FROM jit_access_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id, user_id = %request.user_id))]
    pub async fn insert_jit_request(&self, request: &JitAccessRequest) -> ServiceResult<JitAccessRequest> {
        Ok(sqlx::query_as::<_, JitAccessRequest>(
            r#"
            INSERT INTO jit_access_requests (id, user_id, role_id, reason, duration_minutes, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.role_id)
        .bind(&request.reason)
        .bind(request.duration_minutes)
        .bind(&request.status)
        .bind(request.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Moves a pending request to `approved` (expiring `duration_minutes`
    /// after `now`) or `denied`. Anything not pending is rejected.
    #[instrument(skip(self))]
    pub async fn decide_jit_request(
        &self,
        id: Uuid,
        approver: Uuid,
        decision: JitStatus,
        now: DateTime<Utc>,
    ) -> ServiceResult<JitAccessRequest> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, JitAccessRequest>(
            "SELECT * FROM jit_access_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::NotFound("JIT access request"))?;

        if !request.is_pending() {
            return Err(ServiceError::InvalidState(
                "Only pending requests can be decided".to_string(),
            ));
        }

        let expires_at = match decision {
            JitStatus::Approved => Some(request.expiry_from(now)),
            _ => None,
        };

        let updated = sqlx::query_as::<_, JitAccessRequest>(
            r#"
            UPDATE jit_access_requests
            SET status = $2, approved_by = $3, decided_at = $4, expires_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(decision.as_str())
        .bind(approver)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}
