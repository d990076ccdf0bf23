use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::{sessions::revoke_user_sessions, soft_delete::mark_deleted, Database};
use crate::models::{RevokeReason, User};
use crate::services::error::ServiceResult;
use crate::services::password_policy::HISTORY_DEPTH;
use crate::services::tenant_scope::TenantFilter;
use crate::utils::pagination::PageParams;

/// Partial update. `tenant_id: Some(None)` moves a user to global.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub tenant_id: Option<Option<Uuid>>,
}

impl Database {
    // ==================== Lookup ====================

    pub async fn find_user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        scope: TenantFilter,
        include_deleted: bool,
        page: &PageParams,
    ) -> ServiceResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");
        if !include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        scope.push_condition(&mut qb, "tenant_id");
        page.push_keyset(&mut qb, "users");
        Ok(qb.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    // ==================== Mutation ====================

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn insert_user(&self, user: &User) -> ServiceResult<User> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash, tenant_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.tenant_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn update_user(
        &self,
        id: Uuid,
        scope: TenantFilter,
        changes: UserChanges,
    ) -> ServiceResult<Option<User>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");
        if let Some(email) = changes.email {
            qb.push(", email = ").push_bind(email.trim().to_lowercase());
        }
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(tenant_id) = changes.tenant_id {
            qb.push(", tenant_id = ").push_bind(tenant_id);
        }
        qb.push(" WHERE deleted_at IS NULL AND id = ").push_bind(id);
        scope.push_condition(&mut qb, "tenant_id");
        qb.push(" RETURNING *");
        Ok(qb.build_query_as::<User>().fetch_optional(&self.pool).await?)
    }

    /// Soft-deletes the user and revokes every live session in one transaction.
    #[instrument(skip(self, reason))]
    pub async fn soft_delete_user(
        &self,
        id: Uuid,
        scope: TenantFilter,
        deleted_by: Option<Uuid>,
        reason: Option<String>,
    ) -> ServiceResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        let deleted = mark_deleted::<User, _>(&mut *tx, id, scope, deleted_by, reason).await?;
        if deleted.is_some() {
            let revoked = revoke_user_sessions(&mut *tx, id, RevokeReason::UserDeleted).await?;
            tracing::info!(user_id = %id, revoked, "Sessions revoked for deleted user");
        }
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn record_login(&self, user_id: Uuid) -> ServiceResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Credentials ====================

    /// Most recent outgoing hashes, newest first.
    pub async fn recent_password_hashes(&self, user_id: Uuid) -> ServiceResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM password_history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(HISTORY_DEPTH)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Swaps the hash, archives the old one (keeping the newest few) and
    /// revokes every session. Returns the number of sessions revoked.
    #[instrument(skip(self, new_hash, old_hash))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        new_hash: &str,
        old_hash: Option<&str>,
    ) -> ServiceResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(new_hash)
            .execute(&mut *tx)
            .await?;

        if let Some(old_hash) = old_hash {
            sqlx::query(
                "INSERT INTO password_history (id, user_id, password_hash) VALUES ($1, $2, $3)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(old_hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                DELETE FROM password_history
                WHERE user_id = $1 AND id NOT IN (
                    SELECT id FROM password_history WHERE user_id = $1
                    ORDER BY created_at DESC LIMIT $2
                )
                "#,
            )
            .bind(user_id)
            .bind(HISTORY_DEPTH)
            .execute(&mut *tx)
            .await?;
        }

        let revoked = revoke_user_sessions(&mut *tx, user_id, RevokeReason::PasswordChanged).await?;
        tx.commit().await?;
        Ok(revoked)
    }

    /// Sets or clears (`None`) the encrypted TOTP secret with its backup codes.
    pub async fn set_mfa(
        &self,
        user_id: Uuid,
        encrypted_secret: Option<&str>,
        backup_code_hashes: &[String],
    ) -> ServiceResult<()> {
        sqlx::query(
            "UPDATE users SET mfa_secret = $2, mfa_backup_codes = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(encrypted_secret)
        .bind(backup_code_hashes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes one backup code hash. `false` if it was not present, so a
    /// code can only ever be spent once.
    pub async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET mfa_backup_codes = array_remove(mfa_backup_codes, $2)
            WHERE id = $1 AND $2 = ANY(mfa_backup_codes)
            "#,
        )
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
