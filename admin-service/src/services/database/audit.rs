use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use utoipa::IntoParams;
use uuid::Uuid;

use super::Database;
use crate::models::AuditLog;
use crate::services::error::ServiceResult;
use crate::utils::pagination::PageParams;

pub const EXPORT_ROW_LIMIT: i64 = 10_000;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(resource) = &self.resource {
            qb.push(" AND resource = ").push_bind(resource.clone());
        }
        if let Some(resource_id) = &self.resource_id {
            qb.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(action) = &self.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(actor_id) = self.actor_id {
            qb.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(from) = self.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            qb.push(" AND created_at < ").push_bind(to);
        }
    }
}

impl Database {
    /// Append only. Nothing in the service updates or deletes audit rows.
    pub async fn insert_audit_log(&self, log: &AuditLog) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, actor_id, actor_email, action, resource, resource_id,
                                    before, after, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(log.id)
        .bind(log.actor_id)
        .bind(&log.actor_email)
        .bind(&log.action)
        .bind(&log.resource)
        .bind(&log.resource_id)
        .bind(&log.before)
        .bind(&log.after)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_audit_logs(&self, filter: &AuditFilter, page: &PageParams) -> ServiceResult<Vec<AuditLog>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs WHERE TRUE");
        filter.push_conditions(&mut qb);
        page.push_keyset(&mut qb, "audit_logs");
        Ok(qb.build_query_as::<AuditLog>().fetch_all(&self.pool).await?)
    }

    /// Newest first, capped at [`EXPORT_ROW_LIMIT`].
    #[instrument(skip(self))]
    pub async fn export_audit_logs(&self, filter: &AuditFilter) -> ServiceResult<Vec<AuditLog>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs WHERE TRUE");
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(EXPORT_ROW_LIMIT);
        Ok(qb.build_query_as::<AuditLog>().fetch_all(&self.pool).await?)
    }
}
